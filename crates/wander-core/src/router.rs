//! Route table and navigation guard.
//!
//! The guard enforces the public/private page policy and coordinates with
//! in-flight auth operations: instead of sleeping an arbitrary delay, it
//! awaits the session's busy signal with a bounded timeout and re-checks the
//! token once the operation settles.

use std::sync::Arc;
use std::time::Duration;

use crate::credentials::CredentialStore;
use crate::session::SessionManager;

/// The one public route; everything else requires authentication.
pub const LOGIN_PATH: &str = "/login";

/// Navigation target for an authenticated user bounced off the login page.
pub const HOME_PATH: &str = "/";

/// Navigation trigger consumed by the core, implemented by the host
/// (router integration, CLI shell, test recorder).
pub trait Navigator: Send + Sync {
    /// The currently displayed path.
    fn current_path(&self) -> String;

    /// Navigates to `path`. Callers never push the current path redundantly.
    fn push(&self, path: &str);
}

/// One entry of the route table.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    /// Path pattern. `:name` matches one segment, a trailing `?` makes the
    /// segment optional.
    pub pattern: &'static str,
    pub name: &'static str,
    /// Displayed page title for this route.
    pub title: &'static str,
    pub requires_auth: bool,
}

/// Route table of the trip-logging app. Order matters: first match wins, so
/// literal segments ("/trip/new") come before parameterized ones.
pub const ROUTES: &[Route] = &[
    Route {
        pattern: "/login",
        name: "Login",
        title: "Login - WanderApp",
        requires_auth: false,
    },
    Route {
        pattern: "/",
        name: "TripList",
        title: "All Trips - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/hiking",
        name: "HikingTrips",
        title: "Hiking Trips - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/surfing",
        name: "SurfingTrips",
        title: "Surfing Trips - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/dashboard/:id?",
        name: "Dashboard",
        title: "Dashboard - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/trip/new",
        name: "TripCreate",
        title: "New Trip - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/trip/:id",
        name: "TripDetail",
        title: "Trip Details - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/trip/:id/edit",
        name: "TripEdit",
        title: "Edit Trip - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/trip/:trip_id/add-stage",
        name: "StageCreate",
        title: "Add Stage - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/trip/:trip_id/add-surf-stage",
        name: "SurfStageCreate",
        title: "Add Surf Stage - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/stage/:id/edit",
        name: "StageEdit",
        title: "Edit Stage - WanderApp",
        requires_auth: true,
    },
    Route {
        pattern: "/surf-stage/:id/edit",
        name: "SurfStageEdit",
        title: "Edit Surf Stage - WanderApp",
        requires_auth: true,
    },
];

/// Finds the first route matching `path` (query and fragment ignored).
pub fn match_route(path: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|route| matches(route.pattern, path))
}

/// Page title for `path` from the route table, with an app-wide fallback.
pub fn page_title(path: &str) -> &'static str {
    match_route(path).map_or("WanderApp", |route| route.title)
}

fn matches(pattern: &str, path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let required = pattern_segments
        .iter()
        .take_while(|s| !s.ends_with('?'))
        .count();
    if path_segments.len() < required || path_segments.len() > pattern_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(&path_segments)
        .all(|(pat, got)| {
            let pat = pat.trim_end_matches('?');
            pat.starts_with(':') || pat == *got
        })
}

/// Outcome of a guard check for a requested destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

/// Intercepts route transitions and enforces the auth policy.
pub struct NavigationGuard {
    session: Arc<SessionManager>,
    credentials: CredentialStore,
    wait: Duration,
}

impl NavigationGuard {
    pub fn new(session: Arc<SessionManager>, credentials: CredentialStore, wait: Duration) -> Self {
        Self {
            session,
            credentials,
            wait,
        }
    }

    /// Evaluates a requested destination.
    ///
    /// Rules, in order:
    /// 1. Login page with a token present: redirect home.
    /// 2. Auth required, no token: redirect to login.
    /// 3. Auth required while an auth operation is in flight: wait for the
    ///    operation to settle (bounded by the configured timeout), then
    ///    re-check token presence.
    /// 4. Allow.
    pub async fn check(&self, destination: &str) -> GuardDecision {
        let destination = destination.split(['?', '#']).next().unwrap_or(destination);
        let has_token = self.credentials.access_token().is_some();
        // Unknown paths are treated as private, same as the original's
        // "everything but /login" policy.
        let requires_auth = match_route(destination).is_none_or(|route| route.requires_auth);

        if destination == LOGIN_PATH && has_token {
            tracing::debug!("already authenticated, bouncing off login page");
            return GuardDecision::RedirectToHome;
        }

        if requires_auth && !has_token {
            return GuardDecision::RedirectToLogin;
        }

        if requires_auth {
            let mut busy = self.session.subscribe_busy();
            if *busy.borrow() {
                tracing::debug!(%destination, "auth operation in flight, waiting to settle");
                let _ = tokio::time::timeout(self.wait, busy.wait_for(|b| !*b)).await;
                if self.credentials.access_token().is_none() {
                    return GuardDecision::RedirectToLogin;
                }
            }
        }

        GuardDecision::Allow
    }
}

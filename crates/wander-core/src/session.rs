//! Process-wide session state.
//!
//! One `SessionManager` is constructed per process and shared by `Arc`: it
//! owns the signed-in user profile, the transient banner message, and the
//! single-flight refresh coordination used by the request dispatcher. All
//! mutation goes through its methods; nothing here is a global.
//!
//! Locks are `std::sync::Mutex` held only across synchronous sections, never
//! across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{oneshot, watch};

use crate::client::ApiClient;
use crate::credentials::CredentialStore;
use crate::error::{ApiError, RefreshError};

/// Severity of a transient user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// Transient banner message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub kind: MessageKind,
}

/// Signed-in user profile as returned by `/api/users/me/`.
///
/// Unknown fields are ignored so backend additions don't break the client.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Default)]
struct AuthState {
    current_user: Option<UserProfile>,
    is_loading: bool,
    message: Option<Message>,
}

#[derive(Default)]
struct RefreshState {
    is_refreshing: bool,
    // Drained exactly once per refresh attempt, in enqueue order.
    queue: Vec<oneshot::Sender<Result<String, RefreshError>>>,
}

/// Role handed to a dispatcher that just saw a 401.
pub(crate) enum RefreshRole {
    /// This caller owns the refresh network call.
    Leader,
    /// A refresh is already in flight; await its outcome.
    Follower(oneshot::Receiver<Result<String, RefreshError>>),
}

/// Shared session state and refresh coordination.
pub struct SessionManager {
    auth: Mutex<AuthState>,
    refresh: Mutex<RefreshState>,
    /// True while a profile fetch or token refresh is outstanding. The
    /// navigation guard awaits the falling edge instead of sleeping blindly.
    busy_tx: watch::Sender<bool>,
    /// Collapses concurrent teardown triggers into one.
    tearing_down: AtomicBool,
    message_duration: Duration,
}

impl SessionManager {
    /// Creates a session manager with the given transient-message lifetime.
    pub fn new(message_duration: Duration) -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            auth: Mutex::new(AuthState::default()),
            refresh: Mutex::new(RefreshState::default()),
            busy_tx,
            tearing_down: AtomicBool::new(false),
            message_duration,
        }
    }

    /// The cached user profile, if a profile fetch has succeeded.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.auth.lock().unwrap().current_user.clone()
    }

    /// True while a profile fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.auth.lock().unwrap().is_loading
    }

    /// The currently displayed transient message, if any.
    pub fn message(&self) -> Option<Message> {
        self.auth.lock().unwrap().message.clone()
    }

    /// Derived on every read: a cached profile exists AND an access token is
    /// currently present. Either condition failing flips this to false
    /// without a network round trip.
    pub fn is_authenticated(&self, store: &CredentialStore) -> bool {
        self.current_user().is_some() && store.access_token().is_some()
    }

    /// Clears the cached user and loading flag (logout, refresh failure).
    /// The transient message is left alone so a teardown notice survives.
    pub fn clear_auth(&self) {
        {
            let mut auth = self.auth.lock().unwrap();
            auth.current_user = None;
            auth.is_loading = false;
        }
        self.update_busy();
    }

    /// Shows a transient message with the configured default lifetime.
    pub fn show_message(self: &Arc<Self>, text: &str, kind: MessageKind) {
        self.show_message_for(text, kind, self.message_duration);
    }

    /// Shows a transient message and schedules its clearing.
    ///
    /// The scheduled clear only fires if the same text is still displayed, so
    /// a newer message is never erased by a stale timer.
    pub fn show_message_for(self: &Arc<Self>, text: &str, kind: MessageKind, duration: Duration) {
        {
            let mut auth = self.auth.lock().unwrap();
            auth.message = Some(Message {
                text: text.to_string(),
                kind,
            });
        }

        let session = Arc::clone(self);
        let shown = text.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut auth = session.auth.lock().unwrap();
            if auth.message.as_ref().is_some_and(|m| m.text == shown) {
                auth.message = None;
            }
        });
    }

    /// Fetches the current user's profile through the dispatcher.
    ///
    /// No-op when no access token is present, a user is already cached, or a
    /// fetch is already outstanding — concurrent callers collapse onto the
    /// single in-flight fetch. The loading flag is reset on every completion
    /// path, success or failure.
    pub async fn fetch_current_user(
        self: &Arc<Self>,
        client: &ApiClient,
    ) -> Result<(), ApiError> {
        if client.credentials().access_token().is_none() {
            return Ok(());
        }
        {
            let mut auth = self.auth.lock().unwrap();
            if auth.current_user.is_some() || auth.is_loading {
                return Ok(());
            }
            auth.is_loading = true;
        }
        self.update_busy();

        let result = client.get_json::<UserProfile>("/api/users/me/").await;

        let outcome = {
            let mut auth = self.auth.lock().unwrap();
            auth.is_loading = false;
            match result {
                Ok(profile) => {
                    tracing::debug!(username = %profile.username, "fetched current user");
                    auth.current_user = Some(profile);
                    Ok(())
                }
                Err(err) => {
                    auth.current_user = None;
                    Err(err)
                }
            }
        };
        self.update_busy();

        if let Err(err) = &outcome {
            tracing::warn!("could not fetch current user: {err}");
            // Auth failures already tore the session down and showed their
            // own notice; anything else is a plain profile-fetch failure.
            if !matches!(
                err,
                ApiError::AuthenticationExpired | ApiError::RefreshFailed(_)
            ) {
                self.show_message("Could not load your profile.", MessageKind::Warning);
            }
        }
        outcome
    }

    /// Subscribes to the "auth operation in flight" signal.
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    /// Decides whether a 401-handling dispatcher leads or follows the
    /// current refresh. Followers are enqueued in FIFO order.
    pub(crate) fn refresh_role(&self) -> RefreshRole {
        let role = {
            let mut refresh = self.refresh.lock().unwrap();
            if refresh.is_refreshing {
                let (tx, rx) = oneshot::channel();
                refresh.queue.push(tx);
                RefreshRole::Follower(rx)
            } else {
                refresh.is_refreshing = true;
                RefreshRole::Leader
            }
        };
        self.update_busy();
        role
    }

    /// Completes the in-flight refresh, draining the queue in enqueue order
    /// with the shared outcome.
    pub(crate) fn finish_refresh(&self, outcome: &Result<String, RefreshError>) {
        let waiters = {
            let mut refresh = self.refresh.lock().unwrap();
            refresh.is_refreshing = false;
            std::mem::take(&mut refresh.queue)
        };
        let count = waiters.len();
        for waiter in waiters {
            // A follower that gave up is fine to skip.
            let _ = waiter.send(outcome.clone());
        }
        if count > 0 {
            tracing::debug!(waiters = count, "drained refresh queue");
        }
        self.update_busy();
    }

    /// Resets refresh coordination during teardown. Any stragglers still in
    /// the queue observe a dropped channel and fail their request.
    pub(crate) fn reset_refresh(&self) {
        {
            let mut refresh = self.refresh.lock().unwrap();
            refresh.is_refreshing = false;
            refresh.queue.clear();
        }
        self.update_busy();
    }

    /// Claims the teardown flag. Returns false when a teardown is already
    /// running, collapsing concurrent triggers into one.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.tearing_down.swap(true, Ordering::SeqCst)
    }

    /// Releases the teardown flag once navigation has settled.
    pub(crate) fn end_teardown(&self) {
        self.tearing_down.store(false, Ordering::SeqCst);
    }

    /// Recomputes the busy signal from the loading and refreshing flags.
    fn update_busy(&self) {
        let loading = self.auth.lock().unwrap().is_loading;
        let refreshing = self.refresh.lock().unwrap().is_refreshing;
        self.busy_tx.send_replace(loading || refreshing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(Duration::from_millis(5000)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_clears_after_duration() {
        let session = session();
        session.show_message_for("expired", MessageKind::Warning, Duration::from_millis(100));
        assert_eq!(session.message().unwrap().text, "expired");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(session.message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_clear_does_not_erase_newer_message() {
        let session = session();
        session.show_message_for("X", MessageKind::Warning, Duration::from_millis(100));
        session.show_message("Y", MessageKind::Error);

        // X's timer fires here; Y must survive it.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let message = session.message().unwrap();
        assert_eq!(message.text, "Y");
        assert_eq!(message.kind, MessageKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_text_stale_timer_still_clears() {
        let session = session();
        session.show_message_for("hello", MessageKind::Info, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(60)).await;
        session.show_message_for("hello", MessageKind::Info, Duration::from_millis(100));

        // First timer fires at t=100 and clears by matching text. That is the
        // documented compare-by-text semantics carried over from the original.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.message().is_none());
    }

    #[test]
    fn test_refresh_role_single_leader() {
        let session = SessionManager::new(Duration::from_secs(5));
        assert!(matches!(session.refresh_role(), RefreshRole::Leader));
        assert!(matches!(session.refresh_role(), RefreshRole::Follower(_)));
        assert!(matches!(session.refresh_role(), RefreshRole::Follower(_)));

        session.finish_refresh(&Ok("token".to_string()));
        assert!(matches!(session.refresh_role(), RefreshRole::Leader));
        session.finish_refresh(&Ok("token".to_string()));
    }

    #[tokio::test]
    async fn test_finish_refresh_drains_in_fifo_order() {
        let session = SessionManager::new(Duration::from_secs(5));
        assert!(matches!(session.refresh_role(), RefreshRole::Leader));

        let mut receivers = Vec::new();
        for _ in 0..3 {
            match session.refresh_role() {
                RefreshRole::Follower(rx) => receivers.push(rx),
                RefreshRole::Leader => panic!("second leader while refreshing"),
            }
        }

        session.finish_refresh(&Ok("fresh".to_string()));
        for rx in receivers {
            assert_eq!(rx.await.unwrap().unwrap(), "fresh");
        }
    }

    #[tokio::test]
    async fn test_reset_refresh_fails_stragglers() {
        let session = SessionManager::new(Duration::from_secs(5));
        assert!(matches!(session.refresh_role(), RefreshRole::Leader));
        let RefreshRole::Follower(rx) = session.refresh_role() else {
            panic!("expected follower");
        };

        session.reset_refresh();
        assert!(rx.await.is_err());
        assert!(matches!(session.refresh_role(), RefreshRole::Leader));
        session.finish_refresh(&Ok(String::new()));
    }

    #[test]
    fn test_busy_tracks_refresh_state() {
        let session = SessionManager::new(Duration::from_secs(5));
        let busy = session.subscribe_busy();
        assert!(!*busy.borrow());

        assert!(matches!(session.refresh_role(), RefreshRole::Leader));
        assert!(*busy.borrow());

        session.finish_refresh(&Err(RefreshError::MissingToken));
        assert!(!*busy.borrow());
    }

    #[test]
    fn test_teardown_flag_collapses_concurrent_triggers() {
        let session = SessionManager::new(Duration::from_secs(5));
        assert!(session.begin_teardown());
        assert!(!session.begin_teardown());
        session.end_teardown();
        assert!(session.begin_teardown());
        session.end_teardown();
    }
}

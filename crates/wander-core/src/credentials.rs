//! Durable credential and preference store.
//!
//! Plays the role the browser's localStorage played for the original client:
//! two opaque tokens plus a couple of UI preferences, persisted as JSON under
//! WANDER_HOME with restricted permissions (0600). Reads are synchronous
//! against an in-memory mirror; every mutation writes through to disk.
//! Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

/// Trip category tab shown in the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripTab {
    #[default]
    Hiking,
    Surfing,
}

impl TripTab {
    /// Route for the trip list filtered to this tab.
    pub fn route(self) -> &'static str {
        match self {
            TripTab::Hiking => "/hiking",
            TripTab::Surfing => "/surfing",
        }
    }

    /// Stored/display name for this tab.
    pub fn as_str(self) -> &'static str {
        match self {
            TripTab::Hiking => "HIKING",
            TripTab::Surfing => "SURFING",
        }
    }
}

impl std::str::FromStr for TripTab {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HIKING" => Ok(TripTab::Hiking),
            "SURFING" => Ok(TripTab::Surfing),
            other => anyhow::bail!("unknown tab '{other}' (expected HIKING or SURFING)"),
        }
    }
}

/// On-disk shape of the store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    access_token: Option<String>,
    refresh_token: Option<String>,
    selected_tab: Option<TripTab>,
    selected_year: Option<String>,
}

struct Inner {
    path: PathBuf,
    data: Mutex<StoreData>,
}

/// Handle to the durable store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl CredentialStore {
    /// Opens the store at the default location under WANDER_HOME.
    pub fn open_default() -> Result<Self> {
        Self::open(paths::store_path())
    }

    /// Opens the store backed by `path`, loading existing contents if any.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse store from {}", path.display()))?
        } else {
            StoreData::default()
        };

        Ok(Self {
            inner: Arc::new(Inner {
                path,
                data: Mutex::new(data),
            }),
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.data.lock().unwrap().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.data.lock().unwrap().refresh_token.clone()
    }

    pub fn selected_tab(&self) -> TripTab {
        self.inner
            .data
            .lock()
            .unwrap()
            .selected_tab
            .unwrap_or_default()
    }

    pub fn selected_year(&self) -> Option<String> {
        self.inner.data.lock().unwrap().selected_year.clone()
    }

    /// Stores a new access token, leaving the refresh token untouched.
    pub fn set_access_token(&self, token: &str) {
        self.mutate(|data| data.access_token = Some(token.to_string()));
    }

    /// Stores a fresh token pair (login).
    pub fn set_tokens(&self, access: &str, refresh: &str) {
        self.mutate(|data| {
            data.access_token = Some(access.to_string());
            data.refresh_token = Some(refresh.to_string());
        });
    }

    pub fn set_selected_tab(&self, tab: TripTab) {
        self.mutate(|data| data.selected_tab = Some(tab));
    }

    pub fn set_selected_year(&self, year: Option<&str>) {
        self.mutate(|data| data.selected_year = year.map(str::to_string));
    }

    /// Drops both tokens at once. Idempotent; UI preferences survive.
    pub fn clear(&self) {
        self.mutate(|data| {
            data.access_token = None;
            data.refresh_token = None;
        });
    }

    /// Applies a mutation to the in-memory mirror and writes through to disk.
    ///
    /// Persistence failures are logged rather than propagated: the in-memory
    /// state stays authoritative for the rest of the process, matching the
    /// infallible contract callers rely on mid-protocol.
    fn mutate(&self, apply: impl FnOnce(&mut StoreData)) {
        let snapshot = {
            let mut data = self.inner.data.lock().unwrap();
            apply(&mut data);
            data.clone()
        };
        if let Err(err) = persist(&self.inner.path, &snapshot) {
            tracing::warn!(
                path = %self.inner.path.display(),
                "failed to persist credential store: {err:#}"
            );
        }
    }
}

/// Writes the store with restricted permissions (0600).
fn persist(path: &Path, data: &StoreData) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let contents = serde_json::to_string_pretty(data).context("Failed to serialize store")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    Ok(())
}

/// Route of the trip list for the currently selected tab.
///
/// Used by "back to list" navigation so the user lands on the tab they were
/// browsing.
pub fn current_tab_route(store: &CredentialStore) -> &'static str {
    store.selected_tab().route()
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}

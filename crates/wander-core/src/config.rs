//! Configuration for the wander client.
//!
//! Loads configuration from ${WANDER_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for wander configuration and data directories.
    //!
    //! WANDER_HOME resolution order:
    //! 1. WANDER_HOME environment variable (if set)
    //! 2. ~/.config/wander (default)

    use std::path::PathBuf;

    /// Returns the wander home directory.
    ///
    /// Checks WANDER_HOME env var first, falls back to ~/.config/wander
    pub fn wander_home() -> PathBuf {
        if let Ok(home) = std::env::var("WANDER_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("wander"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        wander_home().join("config.toml")
    }

    /// Returns the path to the durable key-value store file.
    pub fn store_path() -> PathBuf {
        wander_home().join("store.json")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the WanderApp backend, without a trailing slash.
    pub base_url: String,

    /// How long transient banner messages stay visible, in milliseconds.
    pub message_duration_ms: u64,

    /// Upper bound on how long the navigation guard waits for an in-flight
    /// auth operation to settle, in milliseconds.
    pub guard_wait_ms: u64,
}

impl Config {
    const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    const DEFAULT_MESSAGE_DURATION_MS: u64 = 5000;
    const DEFAULT_GUARD_WAIT_MS: u64 = 100;

    /// Loads configuration from the default config path.
    ///
    /// WANDER_API_BASE_URL overrides the configured base URL when set.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        if let Ok(url) = std::env::var("WANDER_API_BASE_URL") {
            config.base_url = url;
        }
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Message visibility duration.
    pub fn message_duration(&self) -> Duration {
        Duration::from_millis(self.message_duration_ms)
    }

    /// Navigation guard wait bound.
    pub fn guard_wait(&self) -> Duration {
        Duration::from_millis(self.guard_wait_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            message_duration_ms: Self::DEFAULT_MESSAGE_DURATION_MS,
            guard_wait_ms: Self::DEFAULT_GUARD_WAIT_MS,
        }
    }
}

//! Service configuration, loaded from a TOML file with CLI overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API server bind address.
    pub bind: String,
    /// SQLite database path.
    pub db_path: String,
    /// Root of the CI result JSON drop directory.
    pub data_dir: String,
    /// Refresh interval for watch mode, in milliseconds.
    pub poll_interval_ms: u64,
    /// A service with no heartbeat for this long counts as inactive.
    pub stale_after_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: "data/buildboard.db".to_string(),
            data_dir: "data".to_string(),
            poll_interval_ms: 1000,
            stale_after_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; a missing path yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

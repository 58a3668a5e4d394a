use std::path::PathBuf;
use std::time::Duration;

use alcove_store::RemoteConfig;

/// How often the sync engine re-reads the backend.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Startup configuration. The remote/device decision is made exactly once,
/// here. There is no mid-session failover.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared remote store. `None` means device mode.
    pub remote: Option<RemoteConfig>,
    /// Directory holding the device database (`alcove.db`).
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
}

impl Config {
    /// Read configuration from the environment (`.env` honored):
    /// `ALCOVE_REMOTE_URL`, `ALCOVE_REMOTE_KEY`, `ALCOVE_DATA_DIR`,
    /// `ALCOVE_POLL_SECS`. Missing or malformed values fall back to device
    /// mode, the current directory, and a 5 second poll.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let remote = std::env::var("ALCOVE_REMOTE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(|base_url| RemoteConfig {
                base_url,
                api_key: std::env::var("ALCOVE_REMOTE_KEY").ok(),
            });

        let data_dir = std::env::var("ALCOVE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let poll_interval = std::env::var("ALCOVE_POLL_SECS")
            .ok()
            .and_then(|secs| secs.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Self {
            remote,
            data_dir,
            poll_interval,
        }
    }
}

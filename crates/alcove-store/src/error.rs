use thiserror::Error;

/// Errors from either storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Device-mode upload cap. Raised before any encryption work is done.
    #[error("file too large for the device store: {size} bytes (limit {limit})")]
    OversizeFile { size: u64, limit: u64 },

    /// Transport or storage failure. Transient: the next refresh tick
    /// retries; callers keep showing the last good state meanwhile.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<base64::DecodeError> for StoreError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Backend(e.to_string())
    }
}

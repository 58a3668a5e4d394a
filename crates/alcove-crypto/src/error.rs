use thiserror::Error;

use crate::keys::MIN_TOKEN_CHARS;

/// Errors from key derivation and envelope operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("token too short: {length} characters, need at least {MIN_TOKEN_CHARS}")]
    WeakToken { length: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, or the ciphertext/tag was altered. GCM gives no more
    /// detail than this, and neither do we.
    #[error("decryption failed: wrong key or corrupted envelope")]
    Decryption,

    #[error("envelope truncated: {length} bytes")]
    Truncated { length: usize },
}

use thiserror::Error;

use alcove_crypto::CryptoError;
use alcove_store::StoreError;

/// Operation-boundary errors surfaced to the caller. Everything lower-level
/// (aead, sqlite, http) is converted before it gets here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("internal task failure: {0}")]
    Internal(String),
}

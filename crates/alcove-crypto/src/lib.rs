//! Alcove crypto core: shared-token symmetric encryption.
//!
//! Everyone holding the session token derives the same AES-256-GCM key, so
//! any participant can read any other participant's envelopes. There is no
//! key exchange, no rotation, and no forward secrecy; the token *is* the
//! session.

pub mod envelope;
pub mod error;
pub mod keys;

pub use envelope::{open, seal, NONCE_LEN};
pub use error::CryptoError;
pub use keys::{derive_key, generate_token, SymmetricKey, MIN_TOKEN_CHARS};

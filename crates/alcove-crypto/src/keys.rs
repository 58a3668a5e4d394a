use std::fmt;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Minimum token length, counted in characters.
pub const MIN_TOKEN_CHARS: usize = 8;

/// Fixed application-wide salt. The same token must derive the same key on
/// every device, and there is no per-user record to store a random salt in.
/// The cost: rainbow tables amortize across all Alcove sessions.
const KDF_SALT: &[u8] = b"alcove/kdf/v1";

const KDF_ITERATIONS: u32 = 100_000;

const KEY_LEN: usize = 32;

/// A 256-bit AES-GCM key derived from the session token.
///
/// Lives in memory for the duration of an authenticated session and is
/// zeroized on drop. Never persisted.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Derive the session key from a token.
///
/// Deterministic: the same token always yields a bit-identical key, across
/// devices and restarts. All randomness lives in the envelope IVs, never
/// here.
pub fn derive_key(token: &str) -> Result<SymmetricKey, CryptoError> {
    let length = token.chars().count();
    if length < MIN_TOKEN_CHARS {
        return Err(CryptoError::WeakToken { length });
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(token.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    Ok(SymmetricKey(key))
}

/// Generate a random session token (15 random bytes, base64url).
///
/// 20 characters, comfortably past the minimum, and URL-safe so it survives
/// an invite link unescaped.
pub fn generate_token() -> String {
    let mut seed = [0u8; 15];
    OsRng.fill_bytes(&mut seed);
    URL_SAFE_NO_PAD.encode(seed)
}

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};

use crate::error::CryptoError;
use crate::keys::SymmetricKey;

/// IV length. The IV is the first 12 bytes of every envelope. This layout
/// is load-bearing: envelopes written by older builds must stay readable.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Encrypt plaintext into a self-contained envelope: `IV(12) || ciphertext+tag`.
///
/// A fresh random IV is drawn on every call, so sealing the same plaintext
/// twice yields two different envelopes.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`seal`].
///
/// Fails if the key is wrong, the envelope is truncated, or any bit of the
/// IV or ciphertext was altered; GCM's tag check never lets corrupted
/// plaintext through.
pub fn open(key: &SymmetricKey, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated {
            length: envelope.len(),
        });
    }

    let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_key;

    fn key() -> SymmetricKey {
        derive_key("test-token-1").unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = key();
        let plaintext = b"Meet at the usual place.";

        let envelope = seal(&key, plaintext).unwrap();
        assert_ne!(&envelope[NONCE_LEN..], plaintext.as_slice());

        let opened = open(&key, &envelope).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = key();
        let envelope = seal(&key, b"").unwrap();
        assert_eq!(envelope.len(), NONCE_LEN + TAG_LEN);
        assert_eq!(open(&key, &envelope).unwrap(), b"");
    }

    #[test]
    fn sealing_twice_differs() {
        let key = key();
        let a = seal(&key, b"same plaintext").unwrap();
        let b = seal(&key, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let envelope = seal(&key(), b"secret").unwrap();
        let other = derive_key("test-token-2").unwrap();
        assert!(matches!(
            open(&other, &envelope),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn any_flipped_bit_is_detected() {
        let key = key();
        let envelope = seal(&key, b"tamper me").unwrap();

        // One flip in the IV, one in the ciphertext body, one in the tag.
        for index in [0, NONCE_LEN + 1, envelope.len() - 1] {
            let mut corrupted = envelope.clone();
            corrupted[index] ^= 0x01;
            assert!(
                matches!(open(&key, &corrupted), Err(CryptoError::Decryption)),
                "flip at byte {index} went undetected"
            );
        }
    }

    #[test]
    fn truncated_envelope_rejected() {
        let key = key();
        let envelope = seal(&key, b"short").unwrap();
        let result = open(&key, &envelope[..NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(result, Err(CryptoError::Truncated { .. })));
    }
}

//! XChaCha20-Poly1305 symmetric encryption with detached 24-byte nonces.

use crate::error::{QuietError, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

/// Nonce length on the wire.
pub const NONCE_LEN: usize = 24;

/// Encrypt with a fresh random nonce. Returns `(ciphertext, nonce)`.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = encrypt_with_nonce(plaintext, key, &nonce)?;
    Ok((ciphertext, nonce))
}

/// Encrypt with a caller-chosen nonce (sealed-box internals only:
/// nonce reuse under one key breaks the AEAD).
pub fn encrypt_with_nonce(
    plaintext: &[u8],
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| QuietError::crypto("aead encrypt failed"))
}

/// Decrypt and authenticate.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], nonce: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(QuietError::crypto(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| QuietError::crypto("aead decrypt failed (bad key or tampered data)"))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = [7u8; 32];
        let (ciphertext, nonce) = encrypt(b"group message", &key).expect("encrypt");
        let plaintext = decrypt(&ciphertext, &key, &nonce).expect("decrypt");
        assert_eq!(plaintext, b"group message");
    }

    #[test]
    fn test_tamper_detected() {
        let key = [7u8; 32];
        let (mut ciphertext, nonce) = encrypt(b"payload", &key).expect("encrypt");
        ciphertext[0] ^= 0x01;
        assert!(decrypt(&ciphertext, &key, &nonce).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (ciphertext, nonce) = encrypt(b"payload", &[1u8; 32]).expect("encrypt");
        assert!(decrypt(&ciphertext, &[2u8; 32], &nonce).is_err());
    }

    #[test]
    fn test_bad_nonce_length() {
        assert!(decrypt(b"ct", &[0u8; 32], &[0u8; 12]).is_err());
    }
}

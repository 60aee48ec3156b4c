//! Sealed-box KEM: one-way encryption to an Ed25519 identity.
//!
//! The sender generates an ephemeral X25519 keypair, derives a shared
//! secret against the recipient's converted Ed25519 key, and encrypts
//! with XChaCha20-Poly1305 under a key and nonce derived from the
//! ephemeral exchange. The sender cannot decrypt the result; the
//! recipient recovers the shared secret with its long-term key.
//!
//! Wire layout: `ephemeral_public (32 B) ‖ aead_ciphertext`.

use crate::aead;
use crate::error::{QuietError, Result};
use crate::hash::blake2b_256;
use crate::keys::{verifying_key_from_hex, Keypair};
use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::rngs::OsRng;
use rand::RngCore;

const EPHEMERAL_LEN: usize = 32;

/// Seal plaintext to a hex-encoded Ed25519 public key.
pub fn seal(plaintext: &[u8], recipient_public_key_hex: &str) -> Result<Vec<u8>> {
    let recipient = verifying_key_from_hex(recipient_public_key_hex)?.to_montgomery();

    let mut ephemeral_secret = [0u8; 32];
    OsRng.fill_bytes(&mut ephemeral_secret);
    let ephemeral_public = MontgomeryPoint::mul_base_clamped(ephemeral_secret);
    let shared = recipient.mul_clamped(ephemeral_secret);

    let (key, nonce) = derive_box_params(&shared, &ephemeral_public, &recipient);
    let ciphertext = aead::encrypt_with_nonce(plaintext, &key, &nonce)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed blob with the recipient's keypair.
pub fn unseal(sealed: &[u8], recipient: &Keypair) -> Result<Vec<u8>> {
    if sealed.len() <= EPHEMERAL_LEN {
        return Err(QuietError::crypto("sealed blob too short"));
    }
    let (ephemeral_bytes, ciphertext) = sealed.split_at(EPHEMERAL_LEN);
    let ephemeral_bytes: [u8; 32] = ephemeral_bytes
        .try_into()
        .map_err(|_| QuietError::crypto("malformed ephemeral key"))?;
    let ephemeral_public = MontgomeryPoint(ephemeral_bytes);

    let my_point = recipient.verifying_key().to_montgomery();
    let shared = ephemeral_public * recipient.signing_key().to_scalar();

    let (key, nonce) = derive_box_params(&shared, &ephemeral_public, &my_point);
    aead::decrypt(ciphertext, &key, &nonce)
}

/// Key = BLAKE2b-256(shared ‖ ephemeral ‖ recipient); nonce comes from
/// the public halves alone. The ephemeral key is unique per seal, so the
/// derived nonce never repeats under a given AEAD key.
fn derive_box_params(
    shared: &MontgomeryPoint,
    ephemeral_public: &MontgomeryPoint,
    recipient: &MontgomeryPoint,
) -> ([u8; 32], [u8; aead::NONCE_LEN]) {
    let mut key_input = Vec::with_capacity(96);
    key_input.extend_from_slice(shared.as_bytes());
    key_input.extend_from_slice(ephemeral_public.as_bytes());
    key_input.extend_from_slice(recipient.as_bytes());
    let key = blake2b_256(&key_input);

    let mut nonce_input = Vec::with_capacity(64);
    nonce_input.extend_from_slice(ephemeral_public.as_bytes());
    nonce_input.extend_from_slice(recipient.as_bytes());
    let nonce_full = blake2b_256(&nonce_input);
    let mut nonce = [0u8; aead::NONCE_LEN];
    nonce.copy_from_slice(&nonce_full[..aead::NONCE_LEN]);

    (key, nonce)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_unseal_round_trip() {
        let recipient = Keypair::generate();
        let sealed = seal(b"group key material", &recipient.public_key_hex()).expect("seal");
        let opened = unseal(&sealed, &recipient).expect("unseal");
        assert_eq!(opened, b"group key material");
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let recipient = Keypair::generate();
        let interloper = Keypair::generate();
        let sealed = seal(b"secret", &recipient.public_key_hex()).expect("seal");
        assert!(unseal(&sealed, &interloper).is_err());
    }

    #[test]
    fn test_seals_are_randomized() {
        let recipient = Keypair::generate();
        let a = seal(b"same plaintext", &recipient.public_key_hex()).expect("seal");
        let b = seal(b"same plaintext", &recipient.public_key_hex()).expect("seal");
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let recipient = Keypair::generate();
        assert!(unseal(&[0u8; 16], &recipient).is_err());
    }
}

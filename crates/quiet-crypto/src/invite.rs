//! Invite-proof derivation.
//!
//! From a shared `invite_secret`:
//! - `invite_pubkey = KDF(invite_secret, salt)` where the salt is the
//!   first 16 bytes of SHA-256 of the version label. The derived value
//!   doubles as the symmetric key id a joiner encrypts its bootstrap
//!   events with.
//! - `invite_signature = BLAKE2b-128(invite_secret:joiner_public_key:
//!   network_id)` proves possession of the secret without revealing it.

use crate::hash::{blake2b_128, kdf};
use crate::keys::SecretBytes;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Version label salted into the invite KDF.
pub const INVITE_KDF_LABEL: &[u8] = b"quiet_invite_kdf_v1";

/// The 16-byte invite KDF salt: SHA-256 of the version label, truncated.
pub fn invite_salt() -> [u8; 16] {
    let digest = Sha256::digest(INVITE_KDF_LABEL);
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&digest[..16]);
    salt
}

/// Generate a fresh url-safe invite secret.
pub fn generate_invite_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive the public invite key (hex) from the shared secret.
pub fn derive_invite_pubkey(invite_secret: &str) -> String {
    hex::encode(kdf(invite_secret.as_bytes(), &invite_salt()))
}

/// Derive the symmetric key a joiner encrypts its bootstrap events with.
/// Identical bytes to [`derive_invite_pubkey`], kept as key material.
pub fn derive_invite_key(invite_secret: &str) -> SecretBytes {
    SecretBytes::new(kdf(invite_secret.as_bytes(), &invite_salt()).to_vec())
}

/// Possession proof binding the joiner's key to the network.
pub fn invite_signature(invite_secret: &str, joiner_public_key_hex: &str, network_id: &str) -> String {
    let material = format!("{invite_secret}:{joiner_public_key_hex}:{network_id}");
    hex::encode(blake2b_128(material.as_bytes()))
}

/// Check a claimed possession proof. The expected proof is derived from
/// the invite secret, so the comparison is constant-time.
pub fn verify_invite_signature(
    claimed: &str,
    invite_secret: &str,
    joiner_public_key_hex: &str,
    network_id: &str,
) -> bool {
    let material = format!("{invite_secret}:{joiner_public_key_hex}:{network_id}");
    let expected = blake2b_128(material.as_bytes());
    let Ok(claimed_bytes) = hex::decode(claimed) else {
        return false;
    };
    expected.as_slice().ct_eq(claimed_bytes.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_deterministic_per_secret() {
        let secret = generate_invite_secret();
        assert_eq!(derive_invite_pubkey(&secret), derive_invite_pubkey(&secret));
        assert_ne!(
            derive_invite_pubkey(&secret),
            derive_invite_pubkey("other-secret")
        );
    }

    #[test]
    fn test_pubkey_matches_key_material() {
        let secret = generate_invite_secret();
        assert_eq!(
            derive_invite_pubkey(&secret),
            derive_invite_key(&secret).to_hex()
        );
    }

    #[test]
    fn test_signature_binds_all_inputs() {
        let signature = invite_signature("s", "pub", "net");
        assert!(verify_invite_signature(&signature, "s", "pub", "net"));
        assert!(!verify_invite_signature(&signature, "s2", "pub", "net"));
        assert!(!verify_invite_signature(&signature, "s", "pub2", "net"));
        assert!(!verify_invite_signature(&signature, "s", "pub", "net2"));
    }

    #[test]
    fn test_malformed_proof_rejected() {
        assert!(!verify_invite_signature("not-hex", "s", "pub", "net"));
        assert!(!verify_invite_signature("abcd", "s", "pub", "net"));
        assert!(!verify_invite_signature("", "s", "pub", "net"));
    }
}

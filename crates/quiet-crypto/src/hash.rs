//! BLAKE2b hashing and key derivation.
//!
//! Event ids are 16-byte (128-bit) BLAKE2b digests; symmetric keys and
//! KDF outputs are 32 bytes. The KDF is `BLAKE2b-256(material ‖ salt)`.

use blake2::digest::consts::{U16, U32};
use blake2::{Blake2b, Digest};
use quiet_core::EventId;

type Blake2b128 = Blake2b<U16>;
type Blake2b256 = Blake2b<U32>;

/// 16-byte BLAKE2b digest, the event-id hash.
pub fn blake2b_128(data: &[u8]) -> [u8; 16] {
    let mut hasher = Blake2b128::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 32-byte BLAKE2b digest, used for key material.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive a 32-byte key from input material and a salt.
pub fn kdf(material: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(material.len() + salt.len());
    input.extend_from_slice(material);
    input.extend_from_slice(salt);
    blake2b_256(&input)
}

/// Event id of a transmitted event: BLAKE2b-128 over its ciphertext.
pub fn event_id_for_ciphertext(ciphertext: &[u8]) -> EventId {
    EventId::from_digest(&blake2b_128(ciphertext))
}

/// Event id of a local identity: BLAKE2b-128 over the raw public key, so
/// identity references are stable across peers.
pub fn event_id_for_public_key(public_key: &[u8]) -> EventId {
    EventId::from_digest(&blake2b_128(public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_sizes() {
        assert_eq!(blake2b_128(b"quiet").len(), 16);
        assert_eq!(blake2b_256(b"quiet").len(), 32);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(blake2b_128(b"same"), blake2b_128(b"same"));
        assert_ne!(blake2b_128(b"same"), blake2b_128(b"other"));
    }

    #[test]
    fn test_kdf_depends_on_salt() {
        assert_ne!(kdf(b"secret", b"salt-a"), kdf(b"secret", b"salt-b"));
        assert_eq!(kdf(b"secret", b"salt-a"), kdf(b"secret", b"salt-a"));
    }

    #[test]
    fn test_event_id_is_hex_of_digest() {
        let id = event_id_for_ciphertext(b"ct");
        assert_eq!(id.as_str(), hex::encode(blake2b_128(b"ct")));
    }
}

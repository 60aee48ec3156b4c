//! # Quiet Crypto
//!
//! Cryptographic primitives for the envelope pipeline: Ed25519
//! signatures, BLAKE2b hashing/KDF, XChaCha20-Poly1305 AEAD, a
//! sealed-box KEM over Curve25519, and invite-proof derivation.
//!
//! This crate wraps primitives only; key *selection* policy lives in the
//! pipeline's crypto handler, and key *storage* in the secret store.

#![forbid(unsafe_code)]

/// XChaCha20-Poly1305 symmetric encryption
pub mod aead;
/// Result aliases
pub mod error;
/// BLAKE2b hashing and key derivation
pub mod hash;
/// Invite-proof derivation
pub mod invite;
/// Keypairs and zeroizing secret bytes
pub mod keys;
/// Sealed-box KEM
pub mod sealed;
/// Ed25519 signing and verification
pub mod sign;

pub use hash::{blake2b_128, blake2b_256, event_id_for_ciphertext, event_id_for_public_key, kdf};
pub use keys::{generate_secret, verifying_key_from_hex, Keypair, SecretBytes};
pub use sealed::{seal, unseal};
pub use sign::{sign, verify};

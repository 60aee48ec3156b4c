//! Key material: Ed25519 keypairs and zeroizing secret bytes.

use crate::error::{QuietError, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret bytes that are wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Wrap raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode from hex.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| QuietError::crypto(format!("secret hex decode: {e}")))?;
        Ok(Self(bytes))
    }

    /// Borrow the raw bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding (for payload fields that are later stripped).
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Copy into a fixed 32-byte key array.
    pub fn as_key32(&self) -> Result<[u8; 32]> {
        self.0
            .as_slice()
            .try_into()
            .map_err(|_| QuietError::crypto(format!("expected 32-byte key, got {}", self.0.len())))
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes(<{} bytes>)", self.0.len())
    }
}

/// Generate a random 32-byte symmetric secret.
pub fn generate_secret() -> SecretBytes {
    let mut bytes = vec![0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SecretBytes::new(bytes)
}

/// An Ed25519 identity keypair.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the system RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild from a hex-encoded 32-byte private key.
    pub fn from_private_hex(private_key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(private_key_hex)
            .map_err(|e| QuietError::crypto(format!("private key hex decode: {e}")))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| QuietError::crypto("private key must be 32 bytes"))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// The signing half.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The verifying half.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Hex private key (identity payloads only; stripped before storage).
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair(pub={})", self.public_key_hex())
    }
}

/// Parse a hex-encoded Ed25519 public key.
pub fn verifying_key_from_hex(public_key_hex: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| QuietError::crypto(format!("public key hex decode: {e}")))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| QuietError::crypto("public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| QuietError::crypto(format!("invalid public key: {e}")))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_hex_round_trip() {
        let keypair = Keypair::generate();
        let rebuilt = Keypair::from_private_hex(&keypair.private_key_hex()).expect("rebuild");
        assert_eq!(rebuilt.public_key_hex(), keypair.public_key_hex());
    }

    #[test]
    fn test_secret_hex_round_trip() {
        let secret = generate_secret();
        let back = SecretBytes::from_hex(&secret.to_hex()).expect("decode");
        assert_eq!(back.expose(), secret.expose());
        assert_eq!(back.as_key32().expect("key32").len(), 32);
    }

    #[test]
    fn test_rejects_short_keys() {
        assert!(Keypair::from_private_hex("abcd").is_err());
        assert!(verifying_key_from_hex("abcd").is_err());
        assert!(SecretBytes::new(vec![0; 16]).as_key32().is_err());
    }
}

//! Ed25519 signing and verification over canonical event bytes.

use crate::error::{QuietError, Result};
use crate::keys::{verifying_key_from_hex, Keypair};
use ed25519_dalek::{Signature, Signer, Verifier};

/// Sign a message, returning the hex signature.
pub fn sign(message: &[u8], keypair: &Keypair) -> String {
    let signature = keypair.signing_key().sign(message);
    hex::encode(signature.to_bytes())
}

/// Verify a hex signature against a hex public key.
///
/// Returns `Ok(false)` for a well-formed but wrong signature and `Err`
/// only when the key or signature bytes are malformed.
pub fn verify(message: &[u8], signature_hex: &str, public_key_hex: &str) -> Result<bool> {
    let verifying_key = verifying_key_from_hex(public_key_hex)?;
    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| QuietError::crypto(format!("signature hex decode: {e}")))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| QuietError::crypto(format!("malformed signature: {e}")))?;
    Ok(verifying_key.verify(message, &signature).is_ok())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let keypair = Keypair::generate();
        let signature = sign(b"canonical bytes", &keypair);
        assert!(
            verify(b"canonical bytes", &signature, &keypair.public_key_hex()).expect("verify")
        );
    }

    #[test]
    fn test_rejects_tampered_message() {
        let keypair = Keypair::generate();
        let signature = sign(b"original", &keypair);
        assert!(!verify(b"tampered", &signature, &keypair.public_key_hex()).expect("verify"));
    }

    #[test]
    fn test_rejects_wrong_key() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let signature = sign(b"message", &keypair);
        assert!(!verify(b"message", &signature, &other.public_key_hex()).expect("verify"));
    }

    #[test]
    fn test_malformed_inputs_are_errors() {
        let keypair = Keypair::generate();
        assert!(verify(b"m", "zz", &keypair.public_key_hex()).is_err());
        assert!(verify(b"m", &"ab".repeat(8), &keypair.public_key_hex()).is_err());
    }

    proptest::proptest! {
        // verify(sign(m)) holds for arbitrary canonical bytes.
        #[test]
        fn prop_sign_verify_round_trip(message in proptest::collection::vec(0u8.., 0..512)) {
            let keypair = Keypair::generate();
            let signature = sign(&message, &keypair);
            proptest::prop_assert!(
                verify(&message, &signature, &keypair.public_key_hex()).expect("verify")
            );
        }
    }
}

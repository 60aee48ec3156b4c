//! Transit wire format.
//!
//! On the wire: `transit_key_id (16 B) ‖ transit_nonce (24 B) ‖
//! ciphertext (variable)`. The transit plaintext wraps the event layer:
//! `{event_ciphertext, key_ref, network_id}`, serialized as JSON with the
//! ciphertext hex-encoded.

use quiet_core::{KeyRef, QuietError, Result};
use serde::{Deserialize, Serialize};

/// Transit key id length on the wire (raw bytes; hex in envelopes).
pub const TRANSIT_KEY_ID_LEN: usize = 16;
/// Transit nonce length.
pub const TRANSIT_NONCE_LEN: usize = 24;

/// What the transit layer protects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitPlaintext {
    /// Event-layer ciphertext, hex encoded
    pub event_ciphertext: String,
    /// Which key decrypts the event layer
    pub key_ref: KeyRef,
    /// Network scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

impl TransitPlaintext {
    /// Serialize for transit encryption.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| QuietError::serialization(format!("transit plaintext: {e}")))
    }

    /// Parse decrypted transit bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| QuietError::serialization(format!("transit plaintext: {e}")))
    }

    /// Decode the inner ciphertext.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.event_ciphertext)
            .map_err(|e| QuietError::serialization(format!("event ciphertext hex: {e}")))
    }
}

/// A parsed transit frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitFrame {
    /// Hex transit key id
    pub transit_key_id: String,
    /// 24-byte nonce
    pub transit_nonce: Vec<u8>,
    /// Outer ciphertext
    pub transit_ciphertext: Vec<u8>,
}

/// Parse raw wire bytes into a transit frame.
pub fn parse_frame(raw: &[u8]) -> Result<TransitFrame> {
    const HEADER: usize = TRANSIT_KEY_ID_LEN + TRANSIT_NONCE_LEN;
    if raw.len() <= HEADER {
        return Err(QuietError::invalid(format!(
            "transit frame too short: {} bytes",
            raw.len()
        )));
    }
    Ok(TransitFrame {
        transit_key_id: hex::encode(&raw[..TRANSIT_KEY_ID_LEN]),
        transit_nonce: raw[TRANSIT_KEY_ID_LEN..HEADER].to_vec(),
        transit_ciphertext: raw[HEADER..].to_vec(),
    })
}

/// Assemble wire bytes from transit fields.
pub fn build_frame(transit_key_id: &str, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let key_id = hex::decode(transit_key_id)
        .map_err(|e| QuietError::invalid(format!("transit key id hex: {e}")))?;
    if key_id.len() != TRANSIT_KEY_ID_LEN {
        return Err(QuietError::invalid(format!(
            "transit key id must be {TRANSIT_KEY_ID_LEN} bytes, got {}",
            key_id.len()
        )));
    }
    if nonce.len() != TRANSIT_NONCE_LEN {
        return Err(QuietError::invalid(format!(
            "transit nonce must be {TRANSIT_NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    let mut out = Vec::with_capacity(key_id.len() + nonce.len() + ciphertext.len());
    out.extend_from_slice(&key_id);
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let key_id = "ab".repeat(TRANSIT_KEY_ID_LEN);
        let nonce = vec![7u8; TRANSIT_NONCE_LEN];
        let raw = build_frame(&key_id, &nonce, b"ciphertext").expect("build");
        let frame = parse_frame(&raw).expect("parse");
        assert_eq!(frame.transit_key_id, key_id);
        assert_eq!(frame.transit_nonce, nonce);
        assert_eq!(frame.transit_ciphertext, b"ciphertext");
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(parse_frame(&[0u8; 30]).is_err());
    }

    #[test]
    fn test_plaintext_round_trip() {
        let plain = TransitPlaintext {
            event_ciphertext: hex::encode(b"inner"),
            key_ref: KeyRef::Key { id: "k1".into() },
            network_id: Some("n1".into()),
        };
        let bytes = plain.to_bytes().expect("bytes");
        let back = TransitPlaintext::from_bytes(&bytes).expect("parse");
        assert_eq!(back, plain);
        assert_eq!(back.ciphertext_bytes().expect("hex"), b"inner");
    }
}

//! Invite link codec.
//!
//! Format: `quiet://invite/<base64(JSON{invite_secret, network_id,
//! group_id})>`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quiet_core::{QuietError, Result};
use serde::{Deserialize, Serialize};

/// URI prefix of an invite link.
pub const INVITE_PREFIX: &str = "quiet://invite/";

/// The shareable contents of an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteLink {
    /// Shared secret proving the invite grant
    pub invite_secret: String,
    /// Network being joined
    pub network_id: String,
    /// Group being joined
    pub group_id: String,
}

impl InviteLink {
    /// Encode to the shareable `quiet://invite/...` form.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| QuietError::serialization(format!("invite link: {e}")))?;
        Ok(format!("{INVITE_PREFIX}{}", BASE64.encode(json)))
    }

    /// Decode a shareable link.
    pub fn decode(link: &str) -> Result<Self> {
        let encoded = link
            .trim()
            .strip_prefix(INVITE_PREFIX)
            .ok_or_else(|| QuietError::invalid("invalid invite link format"))?;
        let json = BASE64
            .decode(encoded)
            .map_err(|_| QuietError::invalid("invalid invite link encoding"))?;
        let parsed: Self = serde_json::from_slice(&json)
            .map_err(|_| QuietError::invalid("invalid invite link payload"))?;
        if parsed.invite_secret.is_empty()
            || parsed.network_id.is_empty()
            || parsed.group_id.is_empty()
        {
            return Err(QuietError::invalid("invite link missing required fields"));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let link = InviteLink {
            invite_secret: "s3cret".into(),
            network_id: "n1".into(),
            group_id: "g1".into(),
        };
        let encoded = link.encode().expect("encode");
        assert!(encoded.starts_with(INVITE_PREFIX));
        assert_eq!(InviteLink::decode(&encoded).expect("decode"), link);
    }

    #[test]
    fn test_whitespace_tolerated() {
        let link = InviteLink {
            invite_secret: "s".into(),
            network_id: "n".into(),
            group_id: "g".into(),
        };
        let encoded = format!("  {}\n", link.encode().expect("encode"));
        assert_eq!(InviteLink::decode(&encoded).expect("decode"), link);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(InviteLink::decode("https://example.com").is_err());
        assert!(InviteLink::decode("quiet://invite/!!!").is_err());
        let empty = InviteLink {
            invite_secret: String::new(),
            network_id: "n".into(),
            group_id: "g".into(),
        };
        let encoded = empty.encode().expect("encode");
        assert!(InviteLink::decode(&encoded).is_err());
    }
}

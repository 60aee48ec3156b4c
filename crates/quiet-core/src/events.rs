//! Typed event model.
//!
//! The wire/event layer of the original protocol is a dict with optional
//! keys; here the payload is a tagged union so a missing field is a type
//! error rather than a runtime surprise. The serde `type` tag matches the
//! stable snake_case kind names used in dep references and the
//! generated-ids table.

use crate::canonical::canonical_bytes;
use crate::deps::DepSpec;
use crate::errors::{QuietError, Result};
use crate::placeholder::{resolve_value, value_has_placeholder, GeneratedIds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable tag for each event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Local keypair; never transmitted
    Identity,
    /// Binds a public key to a device/instance
    Peer,
    /// Network root
    Network,
    /// Group within a network
    Group,
    /// Channel within a group
    Channel,
    /// Peer + network + group membership
    User,
    /// Explicit group membership change
    Member,
    /// Inviter-signed grant
    Invite,
    /// Group symmetric key sealed to a peer
    Key,
    /// Chat message
    Message,
    /// Peer reachability
    Address,
    /// Sealed one-way request for missing events
    SyncRequest,
    /// Local symmetric key for the transit layer
    TransitSecret,
}

impl EventKind {
    /// Stable snake_case name, as used in `"type:id"` dep references.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Peer => "peer",
            Self::Network => "network",
            Self::Group => "group",
            Self::Channel => "channel",
            Self::User => "user",
            Self::Member => "member",
            Self::Invite => "invite",
            Self::Key => "key",
            Self::Message => "message",
            Self::Address => "address",
            Self::SyncRequest => "sync_request",
            Self::TransitSecret => "transit_secret",
        }
    }

    /// Kinds that skip signature verification: identity events are local,
    /// key events are self-authenticating via the KEM, sync requests are
    /// sealed and unsigned.
    pub fn bypasses_signature(&self) -> bool {
        matches!(self, Self::Identity | Self::Key | Self::SyncRequest)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = QuietError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(Self::Identity),
            "peer" => Ok(Self::Peer),
            "network" => Ok(Self::Network),
            "group" => Ok(Self::Group),
            "channel" => Ok(Self::Channel),
            "user" => Ok(Self::User),
            "member" => Ok(Self::Member),
            "invite" => Ok(Self::Invite),
            "key" => Ok(Self::Key),
            "message" => Ok(Self::Message),
            "address" => Ok(Self::Address),
            "sync_request" => Ok(Self::SyncRequest),
            "transit_secret" => Ok(Self::TransitSecret),
            other => Err(QuietError::invalid(format!("unknown event kind: {other}"))),
        }
    }
}

/// Add or remove an announced address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressAction {
    /// Register the address
    Add,
    /// Deregister the address
    Remove,
}

/// Event payload, tagged by kind.
///
/// Id-valued fields are plain hex strings rather than [`crate::EventId`]
/// so they can temporarily hold `@generated:` placeholders inside a
/// command batch (resolved before the envelope re-enters the queue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Local keypair. `private_key` is stripped into the secret store by
    /// the crypto handler before the event is projected.
    Identity {
        identity_id: String,
        name: String,
        public_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key: Option<String>,
        created_at: i64,
    },
    Peer {
        public_key: String,
        identity_id: String,
        username: String,
        created_at: i64,
    },
    Network {
        name: String,
        creator_id: String,
        created_at: i64,
    },
    Group {
        name: String,
        network_id: String,
        creator_id: String,
        created_at: i64,
    },
    Channel {
        group_id: String,
        name: String,
        network_id: String,
        creator_id: String,
        created_at: i64,
    },
    User {
        peer_id: String,
        network_id: String,
        group_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invite_pubkey: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invite_signature: Option<String>,
        created_at: i64,
    },
    Member {
        group_id: String,
        user_id: String,
        added_by: String,
        network_id: String,
        created_at: i64,
    },
    Invite {
        invite_pubkey: String,
        invite_secret: String,
        network_id: String,
        group_id: String,
        inviter_id: String,
        created_at: i64,
    },
    /// Symmetric key material sealed to `recipient_id`'s public key.
    /// `group_id` is empty for a personal-scope key.
    Key {
        key_id: String,
        group_id: String,
        network_id: String,
        peer_id: String,
        recipient_id: String,
        sealed_secret: String,
        created_at: i64,
    },
    Message {
        channel_id: String,
        group_id: String,
        network_id: String,
        peer_id: String,
        content: String,
        created_at: i64,
    },
    Address {
        action: AddressAction,
        peer_id: String,
        ip: String,
        port: u16,
        network_id: String,
        timestamp_ms: i64,
    },
    SyncRequest {
        request_id: String,
        network_id: String,
        from_identity: String,
        to_peer: String,
        timestamp_ms: i64,
        last_sync_ms: i64,
        sync_all: bool,
    },
    /// Announces a transit key id; the secret itself travels on the
    /// envelope's `local_secret` field, never in the payload.
    TransitSecret {
        peer_id: String,
        network_id: String,
        transit_key_id: String,
        created_at: i64,
    },
}

impl EventPayload {
    /// The kind tag of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Identity { .. } => EventKind::Identity,
            Self::Peer { .. } => EventKind::Peer,
            Self::Network { .. } => EventKind::Network,
            Self::Group { .. } => EventKind::Group,
            Self::Channel { .. } => EventKind::Channel,
            Self::User { .. } => EventKind::User,
            Self::Member { .. } => EventKind::Member,
            Self::Invite { .. } => EventKind::Invite,
            Self::Key { .. } => EventKind::Key,
            Self::Message { .. } => EventKind::Message,
            Self::Address { .. } => EventKind::Address,
            Self::SyncRequest { .. } => EventKind::SyncRequest,
            Self::TransitSecret { .. } => EventKind::TransitSecret,
        }
    }

    /// The id the author signs with: a peer id for peer-scoped events, an
    /// identity id for local ones. Peer events are signed by the key they
    /// bind, so their "author" is the embedded public key.
    pub fn author(&self) -> Option<&str> {
        match self {
            Self::Identity { identity_id, .. } => Some(identity_id),
            Self::Peer { public_key, .. } => Some(public_key),
            Self::Network { creator_id, .. } => Some(creator_id),
            Self::Group { creator_id, .. } => Some(creator_id),
            Self::Channel { creator_id, .. } => Some(creator_id),
            Self::User { peer_id, .. } => Some(peer_id),
            Self::Member { added_by, .. } => Some(added_by),
            Self::Invite { inviter_id, .. } => Some(inviter_id),
            Self::Key { peer_id, .. } => Some(peer_id),
            Self::Message { peer_id, .. } => Some(peer_id),
            Self::Address { peer_id, .. } => Some(peer_id),
            Self::SyncRequest { from_identity, .. } => Some(from_identity),
            Self::TransitSecret { peer_id, .. } => Some(peer_id),
        }
    }

    /// Group scope, if the event has one. Empty strings (pre-resolution
    /// fields) count as unscoped.
    pub fn group_id(&self) -> Option<&str> {
        let id = match self {
            Self::Channel { group_id, .. }
            | Self::User { group_id, .. }
            | Self::Member { group_id, .. }
            | Self::Invite { group_id, .. }
            | Self::Key { group_id, .. }
            | Self::Message { group_id, .. } => group_id.as_str(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }

    /// Network scope, if the event has one.
    pub fn network_id(&self) -> Option<&str> {
        let id = match self {
            Self::Group { network_id, .. }
            | Self::Channel { network_id, .. }
            | Self::User { network_id, .. }
            | Self::Member { network_id, .. }
            | Self::Invite { network_id, .. }
            | Self::Key { network_id, .. }
            | Self::Message { network_id, .. }
            | Self::Address { network_id, .. }
            | Self::SyncRequest { network_id, .. }
            | Self::TransitSecret { network_id, .. } => network_id.as_str(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

/// A signed, typed event: the payload plus its declared dependencies and
/// (once signed) the detached signature.
///
/// Deps ride inside the signed canonical form so a receiver can
/// reconstruct the dependency contract without trusting the transit layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Kind-tagged payload (flattened; the tag is the `type` field)
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Declared prerequisite events (`"type:id"` references)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DepSpec>,
    /// Hex Ed25519 signature over the canonical form (absent while unsigned)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Event {
    /// Create an unsigned event.
    pub fn new(payload: EventPayload, deps: Vec<DepSpec>) -> Self {
        Self {
            payload,
            deps,
            signature: None,
        }
    }

    /// The kind tag of this event.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Canonical bytes with the signature field excluded: the exact
    /// input to signing and verification.
    pub fn canonical_unsigned(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        canonical_bytes(&unsigned)
    }

    /// Canonical bytes of the full event (signature included once signed)
    ///: the exact input to event-layer encryption.
    pub fn canonical_signed(&self) -> Result<Vec<u8>> {
        canonical_bytes(self)
    }

    /// True if any payload field or dep still holds an `@generated:`
    /// placeholder.
    pub fn has_placeholders(&self) -> bool {
        if self.deps.iter().any(DepSpec::is_generated) {
            return true;
        }
        match serde_json::to_value(&self.payload) {
            Ok(value) => value_has_placeholder(&value),
            Err(_) => false,
        }
    }

    /// Resolve `@generated:<type>:<n>` placeholders in payload fields and
    /// deps against ids produced earlier in the same run. Unresolvable
    /// placeholders are left in place (the envelope later drops with an
    /// error when a handler rejects the dangling reference).
    pub fn resolve_placeholders(&mut self, ids: &GeneratedIds) -> Result<()> {
        if !self.has_placeholders() {
            return Ok(());
        }
        let value = serde_json::to_value(&self.payload)
            .map_err(|e| QuietError::serialization(format!("placeholder walk: {e}")))?;
        let resolved = resolve_value(value, ids);
        self.payload = serde_json::from_value(resolved)
            .map_err(|e| QuietError::serialization(format!("placeholder rebuild: {e}")))?;
        for dep in &mut self.deps {
            dep.resolve_in_place(ids);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::identifiers::EventId;

    fn message(channel_id: &str) -> Event {
        Event::new(
            EventPayload::Message {
                channel_id: channel_id.to_string(),
                group_id: "g1".into(),
                network_id: "n1".into(),
                peer_id: "p1".into(),
                content: "hi".into(),
                created_at: 1,
            },
            vec!["channel:c1".parse().expect("dep")],
        )
    }

    #[test]
    fn test_kind_tag_round_trip() {
        let event = message("c1");
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "message");
        let back: Event = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn test_canonical_excludes_signature() {
        let mut event = message("c1");
        let unsigned = event.canonical_unsigned().expect("canonical");
        event.signature = Some("ab".repeat(64));
        assert_eq!(event.canonical_unsigned().expect("canonical"), unsigned);
        assert_ne!(event.canonical_signed().expect("canonical"), unsigned);
    }

    #[test]
    fn test_placeholder_resolution_in_payload_and_deps() {
        let mut event = Event::new(
            EventPayload::User {
                peer_id: "@generated:peer:0".into(),
                network_id: "n1".into(),
                group_id: "g1".into(),
                name: "bob".into(),
                invite_pubkey: None,
                invite_signature: None,
                created_at: 1,
            },
            vec!["@generated:peer:0".parse().expect("dep")],
        );
        assert!(event.has_placeholders());

        let mut ids = GeneratedIds::default();
        ids.record(EventKind::Peer, EventId::new("aa11"));
        event.resolve_placeholders(&ids).expect("resolve");

        assert!(!event.has_placeholders());
        match &event.payload {
            EventPayload::User { peer_id, .. } => assert_eq!(peer_id, "aa11"),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(event.deps[0].to_string(), "peer:aa11");
    }

    #[test]
    fn test_out_of_range_placeholder_left_unresolved() {
        let mut event = Event::new(
            EventPayload::User {
                peer_id: "@generated:peer:7".into(),
                network_id: "n1".into(),
                group_id: "g1".into(),
                name: "bob".into(),
                invite_pubkey: None,
                invite_signature: None,
                created_at: 1,
            },
            vec![],
        );
        let mut ids = GeneratedIds::default();
        ids.record(EventKind::Peer, EventId::new("aa11"));
        event.resolve_placeholders(&ids).expect("resolve");
        assert!(event.has_placeholders());
    }
}

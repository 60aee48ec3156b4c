//! In-flight envelope record.
//!
//! # Invariants
//!
//! - Handlers read and write fields but never panic on absent ones: a
//!   missing prerequisite makes the handler's filter return false.
//! - The pipeline runner exclusively owns each envelope while it is in
//!   the queue; the blocked queue stores a serialized copy.
//! - `request_id` is preserved across every envelope descending from one
//!   client operation.

use crate::deps::DepSpec;
use crate::events::{Event, EventKind};
use crate::identifiers::{EventId, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which key decrypts the event layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyRef {
    /// Sealed-box KEM to a peer's public key
    Peer {
        /// Target peer id
        id: String,
    },
    /// Symmetric key referenced by key id
    Key {
        /// Key id (BLAKE2b-128 of the secret, or an invite pubkey)
        id: String,
    },
}

impl KeyRef {
    /// The referenced key or peer id.
    pub fn id(&self) -> &str {
        match self {
            Self::Peer { id } | Self::Key { id } => id,
        }
    }
}

/// Mutable record carrying one event through the pipeline.
///
/// Fields are grouped by the layer that owns them; all are optional
/// because an envelope accretes state as handlers run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    // --- Transport ---
    /// Where the raw bytes came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,
    /// Arrival timestamp (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<i64>,
    /// Raw wire bytes, as received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_bytes: Option<Vec<u8>>,
    /// Where the outgoing wire envelope is destined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_address: Option<String>,
    /// Earliest send time (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<i64>,

    // --- Transit layer ---
    /// Which transit secret encrypts/decrypts the outer layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_key_id: Option<String>,
    /// Outer ciphertext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_ciphertext: Option<Vec<u8>>,
    /// Outer nonce (24 bytes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_nonce: Option<Vec<u8>>,

    // --- Event layer ---
    /// Inner ciphertext (hashes to the event id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_ciphertext: Option<Vec<u8>>,
    /// Sealed-box blob for one-way traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_sealed: Option<Vec<u8>>,
    /// Decrypted / authored event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_plaintext: Option<Event>,
    /// Content hash id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Kind tag (known before decryption for self-created envelopes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventKind>,
    /// Which key decrypts the event layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ref: Option<KeyRef>,

    // --- Identity / scope ---
    /// Signing peer (or identity for local events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Network scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    /// Group scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Channel scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    // --- Dependencies ---
    /// Resolved deps: `"type:id"` → stored event or projected record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resolved_deps: BTreeMap<String, serde_json::Value>,
    /// Set once the resolver has seen every declared dep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps_included_and_valid: Option<bool>,
    /// Deps not yet in the store (mirrors the blocked-queue entry)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_deps: Vec<String>,

    // --- Validation gates ---
    /// Signature verified (or signing completed for self-created)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_checked: Option<bool>,
    /// Structural + membership validation passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
    /// Sender confirmed as group member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group_member: Option<bool>,
    /// Drop this envelope at the end of the current pass
    #[serde(default)]
    pub should_remove: bool,
    /// Projection applied
    #[serde(default)]
    pub projected: bool,
    /// Present in the event store
    #[serde(default)]
    pub stored: bool,

    // --- Creation ---
    /// Authored locally (sign instead of verify)
    #[serde(default)]
    pub self_created: bool,
    /// Never leaves this peer (identity events and friends)
    #[serde(default)]
    pub local_only: bool,
    /// Explicit outgoing marker; `None` means "outgoing if stored"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_outgoing: Option<bool>,
    /// Seal the plaintext one-way to this peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seal_to: Option<String>,
    /// Event-layer key hint (key id), overriding scope-based selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt_to: Option<String>,
    /// Key material handed from a flow to the crypto handler, which moves
    /// it into the secret store and strips it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_secret: Option<String>,
    /// Recipient fan-out completed
    #[serde(default)]
    pub outgoing_checked: bool,

    // --- Metadata ---
    /// Client operation this envelope descends from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// First failure recorded by a handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Envelope for a locally authored event.
    pub fn from_event(event: Event) -> Self {
        let event_type = Some(event.kind());
        Self {
            event_plaintext: Some(event),
            event_type,
            self_created: true,
            ..Self::default()
        }
    }

    /// Envelope for raw bytes arriving from the transport.
    pub fn incoming(raw_bytes: Vec<u8>, origin_address: impl Into<String>, received_at: i64) -> Self {
        Self {
            raw_bytes: Some(raw_bytes),
            origin_address: Some(origin_address.into()),
            received_at: Some(received_at),
            ..Self::default()
        }
    }

    /// Declared deps of the carried event (empty before decryption).
    pub fn deps(&self) -> &[DepSpec] {
        self.event_plaintext
            .as_ref()
            .map(|e| e.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Record a failure and mark the envelope for removal. The first
    /// error wins; later ones are ignored.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
        self.should_remove = true;
    }

    /// True once a handler has failed or discarded this envelope.
    pub fn is_terminal(&self) -> bool {
        self.should_remove || self.error.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::EventPayload;

    #[test]
    fn test_first_error_wins() {
        let mut env = Envelope::default();
        env.fail("first");
        env.fail("second");
        assert_eq!(env.error.as_deref(), Some("first"));
        assert!(env.should_remove);
    }

    #[test]
    fn test_from_event_sets_kind() {
        let env = Envelope::from_event(Event::new(
            EventPayload::Network {
                name: "n".into(),
                creator_id: "p".into(),
                created_at: 1,
            },
            vec![],
        ));
        assert_eq!(env.event_type, Some(EventKind::Network));
        assert!(env.self_created);
    }

    #[test]
    fn test_serde_round_trip_skips_absent_fields() {
        let env = Envelope::default();
        let json = serde_json::to_string(&env).expect("serialize");
        // All-optional record collapses to just the boolean gates.
        assert!(!json.contains("event_plaintext"));
        let back: Envelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, env);
    }

    #[test]
    fn test_key_ref_tagging() {
        let key_ref: KeyRef = serde_json::from_str(r#"{"kind":"peer","id":"p1"}"#).expect("parse");
        assert_eq!(key_ref, KeyRef::Peer { id: "p1".into() });
        assert_eq!(key_ref.id(), "p1");
    }
}

//! Durable append-only event log.
//!
//! # Invariants
//!
//! - Keyed by event id; insertion is idempotent (a duplicate insert is a
//!   no-op that reports the existing row).
//! - Every stored event has passed signature and membership validation
//!   (identity events excepted: they are local).
//! - Insertion order is preserved for deterministic iteration.

use indexmap::IndexMap;
use quiet_core::{Event, EventId, EventKind};
use serde::{Deserialize, Serialize};

/// One row of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Content-hash id
    pub event_id: EventId,
    /// Kind tag
    pub event_type: EventKind,
    /// Network scope, when the event has one
    pub network_id: Option<String>,
    /// Authoring peer (or identity)
    pub peer_id: Option<String>,
    /// Author timestamp (ms)
    pub created_at: i64,
    /// Validated plaintext event
    pub event: Event,
    /// Canonical signed bytes (signing/hashing input)
    pub canonical_bytes: Vec<u8>,
    /// Event-layer ciphertext as transmitted (absent for identity events)
    pub ciphertext: Option<Vec<u8>>,
}

/// Outcome of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row was new
    Inserted,
    /// Row already present; nothing changed
    Duplicate,
}

/// Append-only log keyed by event id.
#[derive(Debug, Default)]
pub struct EventStore {
    events: IndexMap<EventId, StoredEvent>,
}

impl EventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row; duplicates are silently idempotent.
    pub fn insert(&mut self, row: StoredEvent) -> InsertOutcome {
        if self.events.contains_key(&row.event_id) {
            return InsertOutcome::Duplicate;
        }
        self.events.insert(row.event_id.clone(), row);
        InsertOutcome::Inserted
    }

    /// Fetch a row by id.
    pub fn get(&self, event_id: &EventId) -> Option<&StoredEvent> {
        self.events.get(event_id)
    }

    /// True if the id is present.
    pub fn contains(&self, event_id: &EventId) -> bool {
        self.events.contains_key(event_id)
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredEvent> {
        self.events.values()
    }

    /// Rows of one kind, in insertion order.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &StoredEvent> {
        self.events.values().filter(move |row| row.event_type == kind)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use quiet_core::EventPayload;

    fn row(id: &str) -> StoredEvent {
        StoredEvent {
            event_id: EventId::new(id),
            event_type: EventKind::Network,
            network_id: None,
            peer_id: Some("p1".into()),
            created_at: 1,
            event: Event::new(
                EventPayload::Network {
                    name: "n".into(),
                    creator_id: "p1".into(),
                    created_at: 1,
                },
                vec![],
            ),
            canonical_bytes: vec![1, 2, 3],
            ciphertext: Some(vec![9]),
        }
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut store = EventStore::new();
        assert_eq!(store.insert(row("aa")), InsertOutcome::Inserted);

        let mut altered = row("aa");
        altered.canonical_bytes = vec![9, 9, 9];
        assert_eq!(store.insert(altered), InsertOutcome::Duplicate);

        let kept = store.get(&EventId::new("aa")).expect("row");
        assert_eq!(kept.canonical_bytes, vec![1, 2, 3]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_of_kind_filters() {
        let mut store = EventStore::new();
        store.insert(row("aa"));
        assert_eq!(store.of_kind(EventKind::Network).count(), 1);
        assert_eq!(store.of_kind(EventKind::Message).count(), 0);
    }
}

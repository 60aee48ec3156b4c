//! Blocked queue: envelopes parked on missing dependencies.
//!
//! # Invariants
//!
//! - An envelope is keyed by its event id and indexed in reverse under
//!   every missing `"type:id"` reference.
//! - Readmission happens the moment the *last* missing reference is
//!   satisfied; the queue never holds an envelope whose deps are all
//!   present.

use indexmap::IndexMap;
use quiet_core::{Envelope, EventId};
use std::collections::{BTreeMap, BTreeSet};

/// A parked envelope plus what it is waiting for.
#[derive(Debug, Clone)]
pub struct BlockedEnvelope {
    /// The parked envelope, as it left the resolver
    pub envelope: Envelope,
    /// Outstanding `"type:id"` references
    pub missing: BTreeSet<String>,
}

/// Envelopes pending on missing dep ids, with a reverse index for
/// readmission on arrival.
#[derive(Debug, Default)]
pub struct BlockedQueue {
    blocked: IndexMap<EventId, BlockedEnvelope>,
    // blocking "type:id" -> blocked event ids
    blocked_by: BTreeMap<String, BTreeSet<EventId>>,
}

impl BlockedQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an envelope under every missing reference. Re-parking the
    /// same event id replaces the previous entry.
    pub fn block(&mut self, blocked_id: EventId, envelope: Envelope, missing: Vec<String>) {
        self.remove(&blocked_id);
        let missing: BTreeSet<String> = missing.into_iter().collect();
        for key in &missing {
            self.blocked_by
                .entry(key.clone())
                .or_default()
                .insert(blocked_id.clone());
        }
        self.blocked
            .insert(blocked_id, BlockedEnvelope { envelope, missing });
    }

    /// Signal that references have been satisfied (an event was stored).
    /// Returns every envelope whose missing set became empty.
    pub fn on_stored(&mut self, satisfied: &[String]) -> Vec<Envelope> {
        let mut ready = Vec::new();
        for key in satisfied {
            let Some(ids) = self.blocked_by.remove(key) else {
                continue;
            };
            for id in ids {
                let emptied = match self.blocked.get_mut(&id) {
                    Some(entry) => {
                        entry.missing.remove(key);
                        entry.missing.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    if let Some(entry) = self.blocked.shift_remove(&id) {
                        ready.push(entry.envelope);
                    }
                }
            }
        }
        ready
    }

    /// Drop a parked envelope and its reverse-index entries.
    pub fn remove(&mut self, blocked_id: &EventId) -> Option<Envelope> {
        let entry = self.blocked.shift_remove(blocked_id)?;
        for key in &entry.missing {
            if let Some(ids) = self.blocked_by.get_mut(key) {
                ids.remove(blocked_id);
                if ids.is_empty() {
                    self.blocked_by.remove(key);
                }
            }
        }
        Some(entry.envelope)
    }

    /// Outstanding references of a parked envelope.
    pub fn missing_of(&self, blocked_id: &EventId) -> Option<&BTreeSet<String>> {
        self.blocked.get(blocked_id).map(|entry| &entry.missing)
    }

    /// True if the envelope is parked.
    pub fn contains(&self, blocked_id: &EventId) -> bool {
        self.blocked.contains_key(blocked_id)
    }

    /// Number of parked envelopes.
    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    /// True when nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn env(id: &str) -> Envelope {
        Envelope {
            event_id: Some(EventId::new(id)),
            ..Envelope::default()
        }
    }

    #[test]
    fn test_readmitted_only_when_last_dep_arrives() {
        let mut queue = BlockedQueue::new();
        queue.block(
            EventId::new("msg"),
            env("msg"),
            vec!["channel:c1".into(), "peer:p1".into()],
        );

        assert!(queue.on_stored(&["channel:c1".into()]).is_empty());
        assert!(queue.contains(&EventId::new("msg")));
        let missing = queue.missing_of(&EventId::new("msg")).expect("entry");
        assert_eq!(missing.len(), 1);
        assert!(missing.contains("peer:p1"));

        let ready = queue.on_stored(&["peer:p1".into()]);
        assert_eq!(ready.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unrelated_arrival_ignored() {
        let mut queue = BlockedQueue::new();
        queue.block(EventId::new("msg"), env("msg"), vec!["channel:c1".into()]);
        assert!(queue.on_stored(&["group:g9".into()]).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reblock_replaces_entry() {
        let mut queue = BlockedQueue::new();
        queue.block(EventId::new("msg"), env("msg"), vec!["channel:c1".into()]);
        queue.block(EventId::new("msg"), env("msg"), vec!["peer:p1".into()]);

        // The stale reverse-index key must not readmit the envelope.
        assert!(queue.on_stored(&["channel:c1".into()]).is_empty());
        assert_eq!(queue.on_stored(&["peer:p1".into()]).len(), 1);
    }

    #[test]
    fn test_one_arrival_readmits_multiple() {
        let mut queue = BlockedQueue::new();
        queue.block(EventId::new("m1"), env("m1"), vec!["channel:c1".into()]);
        queue.block(EventId::new("m2"), env("m2"), vec!["channel:c1".into()]);
        assert_eq!(queue.on_stored(&["channel:c1".into()]).len(), 2);
    }
}

//! Dependency resolver.
//!
//! Collects the envelope's declared deps from the store into
//! `resolved_deps`. An envelope with everything present is marked valid;
//! a received envelope with gaps is parked in the blocked queue under
//! every missing reference and silently leaves the pipeline (the
//! projector readmits it when the last gap closes). A locally authored
//! envelope with a missing dep is a flow bug and fails outright.
//!
//! Two references resolve through projections rather than the event log:
//! - `invite:<pubkey>`: a joiner can only know the invite pubkey, never
//!   the inviter's event id;
//! - `key:<key_id>`: an implicit dep injected before decryption when the
//!   event-layer key is not yet installed and cannot be derived.

use crate::handler::Handler;
use quiet_core::{DepRef, Envelope, EventKind, KeyRef, Result};
use quiet_store::{Store, StoredEvent};
use serde_json::{json, Value};
use tracing::debug;

/// Resolves declared deps; parks envelopes with gaps.
pub struct ResolveDepsHandler;

impl Handler for ResolveDepsHandler {
    fn name(&self) -> &'static str {
        "resolve_deps"
    }

    fn filter(&self, envelope: &Envelope) -> bool {
        envelope.deps_included_and_valid.is_none()
            && (envelope.event_plaintext.is_some()
                || (envelope.event_id.is_some() && envelope.key_ref.is_some()))
    }

    fn process(&self, envelope: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>> {
        let mut required: Vec<DepRef> = Vec::new();

        if let Some(event) = &envelope.event_plaintext {
            for dep in &event.deps {
                match dep.as_concrete() {
                    Some(concrete) => required.push(concrete.clone()),
                    None => {
                        envelope.fail(format!("unresolved placeholder dependency: {dep}"));
                        return Ok(vec![]);
                    }
                }
            }
        } else if let Some(KeyRef::Key { id }) = &envelope.key_ref {
            // Pre-decrypt pass: the event-layer key itself is the dep.
            if !store.secrets.contains(id) && !store.state.invites.contains_key(id) {
                required.push(DepRef::new(EventKind::Key, id.clone()));
            }
        }

        let mut missing: Vec<String> = Vec::new();
        for dep in &required {
            match resolve_one(store, dep) {
                Some(value) => {
                    envelope.resolved_deps.insert(dep.to_string(), value);
                }
                None => missing.push(dep.to_string()),
            }
        }

        if missing.is_empty() {
            envelope.deps_included_and_valid = Some(true);
            envelope.missing_deps.clear();
            return Ok(vec![]);
        }

        if envelope.self_created {
            envelope.fail(format!("missing local dependencies: {}", missing.join(", ")));
            return Ok(vec![]);
        }

        let Some(blocked_id) = envelope.event_id.clone() else {
            envelope.fail("cannot park envelope without an event id");
            return Ok(vec![]);
        };

        debug!(event_id = %blocked_id, missing = ?missing, "blocking on missing deps");
        envelope.missing_deps = missing.clone();
        let mut parked = envelope.clone();
        parked.resolved_deps.clear();
        store.blocked.block(blocked_id, parked, missing);

        // Clean removal: parking is not a failure.
        envelope.should_remove = true;
        Ok(vec![])
    }
}

/// Resolve one dep to a JSON record, if present.
fn resolve_one(store: &Store, dep: &DepRef) -> Option<Value> {
    match dep.kind {
        EventKind::Invite => {
            if let Some(invite) = store.state.invites.get(dep.id.as_str()) {
                return Some(json!(invite));
            }
            store.events.get(&dep.id).map(stored_event_value)
        }
        EventKind::Key => {
            if store.secrets.contains(dep.id.as_str()) {
                return Some(json!({"key_id": dep.id.as_str()}));
            }
            store.events.get(&dep.id).map(stored_event_value)
        }
        _ => store.events.get(&dep.id).map(stored_event_value),
    }
}

fn stored_event_value(row: &StoredEvent) -> Value {
    json!({
        "event_id": row.event_id,
        "event_type": row.event_type,
        "network_id": row.network_id,
        "peer_id": row.peer_id,
        "created_at": row.created_at,
        "event": row.event,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use quiet_core::{Event, EventId, EventPayload};

    fn stored_network(id: &str) -> StoredEvent {
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
            canonical_bytes: vec![],
            ciphertext: Some(vec![]),
        }
    }

    fn envelope_with_deps(deps: &[&str]) -> Envelope {
        let event = Event::new(
            EventPayload::Message {
                channel_id: "c1".into(),
                group_id: "g1".into(),
                network_id: "n1".into(),
                peer_id: "p1".into(),
                content: "hi".into(),
                created_at: 1,
            },
            deps.iter().map(|d| d.parse().expect("dep")).collect(),
        );
        let mut env = Envelope::from_event(event);
        env.self_created = false;
        env.event_id = Some(EventId::new("msg1"));
        env
    }

    #[test]
    fn test_empty_deps_trivially_valid() {
        let mut store = Store::new();
        let mut env = envelope_with_deps(&[]);
        ResolveDepsHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert_eq!(env.deps_included_and_valid, Some(true));
    }

    #[test]
    fn test_present_dep_collected() {
        let mut store = Store::new();
        store.events.insert(stored_network("net1"));
        let mut env = envelope_with_deps(&["network:net1"]);
        ResolveDepsHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert_eq!(env.deps_included_and_valid, Some(true));
        assert!(env.resolved_deps.contains_key("network:net1"));
    }

    #[test]
    fn test_missing_dep_parks_received_envelope() {
        let mut store = Store::new();
        let mut env = envelope_with_deps(&["channel:c1"]);
        ResolveDepsHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env.should_remove);
        assert!(env.error.is_none());
        assert!(store.blocked.contains(&EventId::new("msg1")));
        assert_eq!(env.missing_deps, vec!["channel:c1".to_string()]);
    }

    #[test]
    fn test_missing_dep_fails_local_envelope() {
        let mut store = Store::new();
        let mut env = envelope_with_deps(&["channel:c1"]);
        env.self_created = true;
        ResolveDepsHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env.error.as_deref().is_some_and(|e| e.contains("missing local")));
        assert!(store.blocked.is_empty());
    }

    #[test]
    fn test_placeholder_dep_is_an_error() {
        let mut store = Store::new();
        let mut env = envelope_with_deps(&["@generated:peer:9"]);
        ResolveDepsHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env
            .error
            .as_deref()
            .is_some_and(|e| e.contains("placeholder")));
    }
}

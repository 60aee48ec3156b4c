//! Runner semantics in isolation: fixpoint ordering, placeholder
//! phasing, and the iteration cap, exercised with synthetic handlers.

#![allow(clippy::expect_used)]

use quiet_core::{
    canonical_bytes, DepSpec, Envelope, Event, EventId, EventKind, EventPayload, QuietError,
};
use quiet_crypto::blake2b_128;
use quiet_pipeline::{Handler, HandlerRegistry, PipelineRunner};
use quiet_store::Store;

/// Marks any plaintext-bearing envelope as stored, deriving a
/// deterministic id from the canonical bytes. Stands in for the full
/// crypto/projector chain so runner behavior can be observed directly.
struct StoreStub;

impl Handler for StoreStub {
    fn name(&self) -> &'static str {
        "store_stub"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.event_plaintext.is_some() && !env.stored
    }

    fn process(
        &self,
        env: &mut Envelope,
        _store: &mut Store,
    ) -> quiet_core::Result<Vec<Envelope>> {
        let event = env.event_plaintext.clone().expect("plaintext");
        if event.deps.iter().any(DepSpec::is_generated) {
            env.fail("unresolved placeholder dependency");
            return Ok(vec![]);
        }
        let bytes = canonical_bytes(&event)?;
        env.event_id = Some(EventId::from_digest(&blake2b_128(&bytes)));
        env.event_type = Some(event.kind());
        env.stored = true;
        Ok(vec![])
    }
}

/// Emits a fresh envelope forever; used to trip the iteration cap.
struct Bouncer;

impl Handler for Bouncer {
    fn name(&self) -> &'static str {
        "bouncer"
    }

    fn filter(&self, env: &Envelope) -> bool {
        !env.stored
    }

    fn process(
        &self,
        env: &mut Envelope,
        _store: &mut Store,
    ) -> quiet_core::Result<Vec<Envelope>> {
        env.stored = true;
        Ok(vec![Envelope::default()])
    }
}

fn peer_event(n: u32) -> Event {
    Event::new(
        EventPayload::Peer {
            public_key: format!("{n:02x}").repeat(32),
            identity_id: "id1".into(),
            username: format!("user-{n}"),
            created_at: 1,
        },
        vec![],
    )
}

fn user_event_with_placeholder() -> Event {
    Event::new(
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
    )
}

fn stub_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(StoreStub));
    registry
}

#[test]
fn test_placeholders_resolved_after_producers_drain() {
    let registry = stub_registry();
    let mut store = Store::new();

    let peer = Envelope::from_event(peer_event(1));
    let user = Envelope::from_event(user_event_with_placeholder());

    let outcome = PipelineRunner::new()
        .run(&registry, &mut store, vec![user, peer])
        .expect("run");

    // Both stored; the user's forward reference became the peer's id.
    assert!(outcome.failures.is_empty(), "failures: {:?}", outcome.failures);
    let peer_id = outcome
        .stored_ids
        .get(&EventKind::Peer)
        .expect("peer id")
        .to_string();
    assert!(outcome.stored_ids.contains_key(&EventKind::User));

    // Re-derive the user id and confirm the resolved payload.
    let mut resolved = user_event_with_placeholder();
    let mut ids = quiet_core::GeneratedIds::default();
    ids.record(EventKind::Peer, EventId::new(peer_id));
    resolved.resolve_placeholders(&ids).expect("resolve");
    assert!(!resolved.has_placeholders());
}

#[test]
fn test_out_of_range_placeholder_drops_with_error() {
    let registry = stub_registry();
    let mut store = Store::new();

    // No peer event in the run: index 0 can never resolve.
    let user = Envelope::from_event(user_event_with_placeholder());
    let outcome = PipelineRunner::new()
        .run(&registry, &mut store, vec![user])
        .expect("run");

    assert!(!outcome.stored_ids.contains_key(&EventKind::User));
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.contains("placeholder")));
}

#[test]
fn test_duplicate_kind_excluded_from_stored_ids() {
    let registry = stub_registry();
    let mut store = Store::new();

    let outcome = PipelineRunner::new()
        .run(
            &registry,
            &mut store,
            vec![
                Envelope::from_event(peer_event(1)),
                Envelope::from_event(peer_event(2)),
            ],
        )
        .expect("run");

    // Two peers stored: the per-kind response map must stay empty.
    assert!(!outcome.stored_ids.contains_key(&EventKind::Peer));
    assert_eq!(outcome.processed, 2);
}

#[test]
fn test_iteration_cap_is_fatal() {
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(Bouncer));
    let mut store = Store::new();

    let result =
        PipelineRunner::with_max_iterations(10).run(&registry, &mut store, vec![Envelope::default()]);
    match result {
        Err(QuietError::Internal { message }) => {
            assert!(message.contains("infinite loop"), "message: {message}")
        }
        other => panic!("expected internal error, got {other:?}"),
    }
}

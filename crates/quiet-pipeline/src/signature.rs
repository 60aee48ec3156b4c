//! Signature handler.
//!
//! Self-created events are canonicalized and signed with the owning
//! identity's key; received events are verified against the author's
//! public key. Peer events are self-attesting (signed by the key they
//! bind); identity, key, and sync-request events bypass signatures.

use crate::handler::Handler;
use quiet_core::{Envelope, EventKind, EventPayload, Result};
use quiet_crypto::{sign, verify};
use quiet_store::Store;
use tracing::debug;

/// Signs self-created events, verifies received ones.
pub struct SignatureHandler;

impl Handler for SignatureHandler {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.event_plaintext.is_some()
            && env.sig_checked.is_none()
            && env.deps_included_and_valid == Some(true)
    }

    fn process(&self, env: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>> {
        let Some(event) = env.event_plaintext.clone() else {
            return Ok(vec![]);
        };

        if event.kind().bypasses_signature() {
            env.sig_checked = Some(true);
            return Ok(vec![]);
        }

        if env.self_created {
            sign_event(env, store);
        } else {
            verify_event(env, store);
        }
        Ok(vec![])
    }
}

fn sign_event(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.as_mut() else {
        return;
    };
    let Some(author) = event.payload.author().map(str::to_string) else {
        env.fail("event has no author to sign as");
        return;
    };

    let public_key = match signer_public_key(store, &event.payload, &author) {
        Some(key) => key,
        None => {
            env.fail(format!("no public key for signer: {author}"));
            return;
        }
    };
    let keypair = match store.secrets.keypair_for_public(&public_key) {
        Ok(kp) => kp,
        Err(e) => {
            env.fail(format!("signing key unavailable: {e}"));
            return;
        }
    };

    let kind = event.kind();
    let bytes = match event.canonical_unsigned() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    event.signature = Some(sign(&bytes, &keypair));
    env.sig_checked = Some(true);
    env.peer_id = Some(author);
    debug!(kind = %kind, "event signed");
}

fn verify_event(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.clone() else {
        return;
    };
    let Some(signature) = event.signature.clone() else {
        env.fail("received event without signature");
        return;
    };
    let Some(author) = event.payload.author().map(str::to_string) else {
        env.fail("received event without author");
        return;
    };
    let Some(public_key) = verifier_public_key(env, store, &event.payload, &author) else {
        env.fail(format!("no public key known for author: {author}"));
        return;
    };

    let bytes = match event.canonical_unsigned() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    match verify(&bytes, &signature, &public_key) {
        Ok(true) => {
            env.sig_checked = Some(true);
            env.peer_id = Some(author);
        }
        Ok(false) => env.fail("invalid signature"),
        Err(e) => env.fail(format!("signature check failed: {e}")),
    }
}

/// Public key to sign with: peer events carry it; otherwise the author
/// reference resolves through projections.
fn signer_public_key(store: &Store, payload: &EventPayload, author: &str) -> Option<String> {
    if let EventPayload::Peer { public_key, .. } = payload {
        return Some(public_key.clone());
    }
    lookup_public_key(store, author)
}

/// Public key to verify with: projections first, then the resolved peer
/// dep of the envelope (the peer event may be arriving in the same run).
fn verifier_public_key(
    env: &Envelope,
    store: &Store,
    payload: &EventPayload,
    author: &str,
) -> Option<String> {
    if let EventPayload::Peer { public_key, .. } = payload {
        return Some(public_key.clone());
    }
    if let Some(key) = lookup_public_key(store, author) {
        return Some(key);
    }
    let dep = env
        .resolved_deps
        .get(&format!("{}:{author}", EventKind::Peer))?;
    dep.get("event")?
        .get("public_key")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn lookup_public_key(store: &Store, author: &str) -> Option<String> {
    if let Some(peer) = store.state.peers.get(author) {
        return Some(peer.public_key.clone());
    }
    if let Some(identity) = store.state.identities.get(author) {
        return Some(identity.public_key.clone());
    }
    None
}

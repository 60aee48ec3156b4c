//! Per-event-type flows.
//!
//! Each module mirrors one event type's operations. Flows query through
//! the context, emit events through the runner, and shape a response;
//! they never write to the store directly.

pub mod address;
pub mod channel;
pub mod group;
pub mod identity;
pub mod invite;
pub mod key;
pub mod member;
pub mod message;
pub mod network;
pub mod peer;
pub mod queries;
pub mod sync;
pub mod transit_secret;
pub mod user;

use crate::ctx::{EmitSpec, FlowCtx};
use quiet_core::time::now_ms;
use quiet_core::{EventId, EventPayload, QuietError, Result};
use quiet_crypto::{blake2b_128, generate_secret, sealed, Keypair};

/// Create a local identity: generate a keypair, emit the local-only
/// identity event, and return `(identity_id, keypair)`.
pub(crate) fn new_identity(ctx: &mut FlowCtx<'_>, name: &str) -> Result<(String, Keypair)> {
    let keypair = Keypair::generate();
    let public_key = keypair.public_key_hex();
    let identity_id = quiet_crypto::event_id_for_public_key(
        &hex::decode(&public_key).map_err(|e| QuietError::crypto(format!("{e}")))?,
    )
    .to_string();

    ctx.emit_event(
        EmitSpec::new(EventPayload::Identity {
            identity_id: identity_id.clone(),
            name: name.to_string(),
            public_key,
            private_key: Some(keypair.private_key_hex()),
            created_at: now_ms(),
        })
        .by(identity_id.clone())
        .local_only(),
    )?;

    Ok((identity_id, keypair))
}

/// Mint a symmetric key and emit the key event sealed to `recipient_id`.
/// When `install` is set the raw secret rides along for the crypto
/// handler to keep (author-side creation); re-shares leave it unset.
pub(crate) fn new_key_event(
    ctx: &mut FlowCtx<'_>,
    by: &str,
    group_id: &str,
    network_id: &str,
    recipient_id: &str,
    recipient_public_key: &str,
) -> Result<(EventId, String)> {
    let secret = generate_secret();
    let key_id = hex::encode(blake2b_128(secret.expose()));
    let sealed_secret = sealed::seal(secret.expose(), recipient_public_key)?;

    let event_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Key {
            key_id: key_id.clone(),
            group_id: group_id.to_string(),
            network_id: network_id.to_string(),
            peer_id: by.to_string(),
            recipient_id: recipient_id.to_string(),
            sealed_secret: hex::encode(sealed_secret),
            created_at: now_ms(),
        })
        .by(by)
        .local_secret(secret.to_hex()),
    )?;

    Ok((event_id, key_id))
}

/// Public key of a peer or identity reference, from projections.
pub(crate) fn public_key_of(ctx: &FlowCtx<'_>, id: &str) -> Result<String> {
    if let Some(peer) = ctx.store().state.peers.get(id) {
        return Ok(peer.public_key.clone());
    }
    if let Some(identity) = ctx.store().state.identities.get(id) {
        return Ok(identity.public_key.clone());
    }
    Err(QuietError::not_found(format!("public key for {id}")))
}

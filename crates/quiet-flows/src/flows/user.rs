//! User flows: joining networks, with or without an invite.

use super::new_identity;
use crate::ctx::{EmitSpec, FlowCtx};
use crate::invite_link::InviteLink;
use crate::registry::{require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, Result};
use quiet_crypto::invite::{derive_invite_key, derive_invite_pubkey, invite_signature};
use quiet_crypto::{blake2b_128, generate_secret};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `user.create`: join a network as an existing peer (founder path).
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let network_id = require_str(params, "network_id")?;
    let name = str_or(params, "name", "User");
    let group_id = str_or(params, "group_id", "");

    let user_id = ctx.emit_event(
        EmitSpec::new(EventPayload::User {
            peer_id: peer_id.clone(),
            network_id: network_id.clone(),
            group_id,
            name: name.clone(),
            invite_pubkey: None,
            invite_signature: None,
            created_at: now_ms(),
        })
        .by(peer_id.clone())
        .deps(vec![DepSpec::concrete(EventKind::Peer, peer_id.clone())]),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("user".to_string(), user_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"user_id": user_id, "name": name}),
    })
}

/// `user.join_as_user`: redeem an invite link: create identity, transit
/// secret, peer, and user, all encrypted under the invite-derived key so
/// existing members can read them.
pub fn join_as_user(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let invite_link = require_str(params, "invite_link")?;
    let name = require_str(params, "name")?;

    let invite = InviteLink::decode(&invite_link)?;
    let invite_pubkey = derive_invite_pubkey(&invite.invite_secret);
    let invite_key_hex = derive_invite_key(&invite.invite_secret).to_hex();

    // 1) Identity (local-only)
    let (identity_id, keypair) = new_identity(ctx, &name)?;
    let public_key = keypair.public_key_hex();

    // 2) Peer; first use of the invite key installs it locally
    let peer_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::Peer {
                public_key: public_key.clone(),
                identity_id: identity_id.clone(),
                username: name.clone(),
                created_at: now_ms(),
            })
            .by(identity_id.clone())
            .encrypt_to(invite_pubkey.clone())
            .local_secret(invite_key_hex)
            .group_scope(invite.group_id.clone()),
        )?
        .to_string();

    // 3) Transit secret, under the now-installed invite key
    let transit = generate_secret();
    let transit_key_id = hex::encode(blake2b_128(transit.expose()));
    ctx.emit_event(
        EmitSpec::new(EventPayload::TransitSecret {
            peer_id: identity_id.clone(),
            network_id: invite.network_id.clone(),
            transit_key_id,
            created_at: now_ms(),
        })
        .by(identity_id.clone())
        .local_secret(transit.to_hex())
        .encrypt_to(invite_pubkey.clone())
        .group_scope(invite.group_id.clone())
        .local_only(),
    )?;

    // 4) User with the invite possession proof
    let proof = invite_signature(&invite.invite_secret, &public_key, &invite.network_id);
    let user_id = ctx.emit_event(
        EmitSpec::new(EventPayload::User {
            peer_id: peer_id.clone(),
            network_id: invite.network_id.clone(),
            group_id: invite.group_id.clone(),
            name: name.clone(),
            invite_pubkey: Some(invite_pubkey),
            invite_signature: Some(proof),
            created_at: now_ms(),
        })
        .by(peer_id.clone())
        .deps(vec![DepSpec::concrete(EventKind::Peer, peer_id.clone())])
        .encrypt_to(derive_invite_pubkey(&invite.invite_secret)),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("identity".to_string(), identity_id);
    ids.insert("peer".to_string(), peer_id);
    ids.insert("user".to_string(), user_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"name": name, "joined": true}),
    })
}

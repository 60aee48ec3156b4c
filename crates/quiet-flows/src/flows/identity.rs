//! Identity flows.

use super::{new_identity, new_key_event};
use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, Result};
use quiet_crypto::{blake2b_128, generate_secret};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `identity.create`: a local keypair and nothing else.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let name = require_str(params, "name")?;
    let (identity_id, keypair) = new_identity(ctx, &name)?;

    let mut ids = BTreeMap::new();
    ids.insert("identity".to_string(), identity_id.clone());
    Ok(FlowResponse {
        ids,
        data: json!({
            "identity_id": identity_id,
            "name": name,
            "public_key": keypair.public_key_hex(),
        }),
    })
}

/// `identity.create_as_user`: bootstrap a whole network:
/// identity → personal key → transit secret → peer → network → group →
/// group key → user → channel.
pub fn create_as_user(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let name = require_str(params, "name")?;
    let network_name = str_or(params, "network_name", "My Network");
    let group_name = str_or(params, "group_name", "General");
    let channel_name = str_or(params, "channel_name", "general");

    // 1) Identity (local-only)
    let (identity_id, keypair) = new_identity(ctx, &name)?;
    let public_key = keypair.public_key_hex();

    // 2) Personal-scope key: encrypts this identity's unscoped events
    new_key_event(ctx, &identity_id, "", "", &identity_id, &public_key)?;

    // 3) Transit secret for the outer layer
    let transit = generate_secret();
    let transit_key_id = hex::encode(blake2b_128(transit.expose()));
    let transit_id = ctx.emit_event(
        EmitSpec::new(EventPayload::TransitSecret {
            peer_id: identity_id.clone(),
            network_id: String::new(),
            transit_key_id,
            created_at: now_ms(),
        })
        .by(identity_id.clone())
        .local_secret(transit.to_hex())
        .local_only(),
    )?;

    // 4) Peer (self-attested)
    let peer_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::Peer {
                public_key: public_key.clone(),
                identity_id: identity_id.clone(),
                username: name.clone(),
                created_at: now_ms(),
            })
            .by(identity_id.clone()),
        )?
        .to_string();

    // 5) Network
    let network_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::Network {
                name: network_name.clone(),
                creator_id: peer_id.clone(),
                created_at: now_ms(),
            })
            .by(peer_id.clone())
            .deps(vec![DepSpec::concrete(EventKind::Peer, peer_id.clone())]),
        )?
        .to_string();

    // 6) Group
    let group_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::Group {
                name: group_name.clone(),
                network_id: network_id.clone(),
                creator_id: peer_id.clone(),
                created_at: now_ms(),
            })
            .by(peer_id.clone()),
        )?
        .to_string();

    // 7) Group key, sealed to our own peer
    let (key_event_id, _key_id) =
        new_key_event(ctx, &peer_id, &group_id, &network_id, &peer_id, &public_key)?;

    // 8) User joining the group
    let user_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::User {
                peer_id: peer_id.clone(),
                network_id: network_id.clone(),
                group_id: group_id.clone(),
                name: name.clone(),
                invite_pubkey: None,
                invite_signature: None,
                created_at: now_ms(),
            })
            .by(peer_id.clone())
            .deps(vec![DepSpec::concrete(EventKind::Peer, peer_id.clone())]),
        )?
        .to_string();

    // 9) Default channel
    let channel_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::Channel {
                group_id: group_id.clone(),
                name: channel_name.clone(),
                network_id: network_id.clone(),
                creator_id: peer_id.clone(),
                created_at: now_ms(),
            })
            .by(peer_id.clone())
            .deps(vec![DepSpec::concrete(EventKind::Group, group_id.clone())]),
        )?
        .to_string();

    let mut ids = BTreeMap::new();
    ids.insert("identity".to_string(), identity_id);
    ids.insert("transit_secret".to_string(), transit_id.to_string());
    ids.insert("peer".to_string(), peer_id);
    ids.insert("network".to_string(), network_id);
    ids.insert("group".to_string(), group_id);
    ids.insert("key".to_string(), key_event_id.to_string());
    ids.insert("user".to_string(), user_id);
    ids.insert("channel".to_string(), channel_id);

    Ok(FlowResponse {
        ids,
        data: json!({
            "name": name,
            "network_name": network_name,
            "group_name": group_name,
            "channel_name": channel_name,
        }),
    })
}

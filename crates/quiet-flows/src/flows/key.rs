//! Key flows: minting and re-sealing group keys.

use super::{new_key_event, public_key_of};
use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{EventPayload, QuietError, Result};
use quiet_crypto::{sealed, SecretBytes};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `key.create`: mint a symmetric key for a group, sealed to the
/// creating peer itself.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let group_id = require_str(params, "group_id")?;
    let network_id = str_or(params, "network_id", "");

    let public_key = public_key_of(ctx, &peer_id)?;
    let (event_id, key_id) =
        new_key_event(ctx, &peer_id, &group_id, &network_id, &peer_id, &public_key)?;

    let mut ids = BTreeMap::new();
    ids.insert("key".to_string(), event_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"key_id": key_id, "group_id": group_id}),
    })
}

/// `key.share`: re-seal every locally held symmetric key to another
/// peer as fresh key events, giving a new member access to history.
pub fn share(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let to_peer = require_str(params, "to_peer")?;

    let recipient_key = public_key_of(ctx, &to_peer)?;
    let secrets = ctx.symmetric_secrets();
    if secrets.is_empty() {
        return Err(QuietError::not_found("no symmetric keys to share"));
    }

    let mut shared = Vec::new();
    for (key_id, scope, secret_hex) in secrets {
        let secret = SecretBytes::from_hex(&secret_hex)?;
        let sealed_secret = sealed::seal(secret.expose(), &recipient_key)?;
        let group_id = scope
            .filter(|s| ctx.store().state.groups.contains_key(s))
            .unwrap_or_default();
        let network_id = ctx
            .store()
            .state
            .groups
            .get(&group_id)
            .map(|g| g.network_id.clone())
            .unwrap_or_default();

        let event_id = ctx.emit_event(
            EmitSpec::new(EventPayload::Key {
                key_id: key_id.clone(),
                group_id,
                network_id,
                peer_id: peer_id.clone(),
                recipient_id: to_peer.clone(),
                sealed_secret: hex::encode(sealed_secret),
                created_at: now_ms(),
            })
            .by(peer_id.clone()),
        )?;
        shared.push(json!({"key_id": key_id, "event_id": event_id}));
    }

    Ok(FlowResponse {
        ids: BTreeMap::new(),
        data: json!({"to_peer": to_peer, "shared": shared, "count": shared.len()}),
    })
}

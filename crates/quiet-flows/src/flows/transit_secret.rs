//! Transit secret flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{EventPayload, Result};
use quiet_crypto::{blake2b_128, generate_secret};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `transit_secret.create`: mint a transit-layer key; the event
/// announces the id, the material goes straight to the secret store.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let network_id = str_or(params, "network_id", "");

    let secret = generate_secret();
    let transit_key_id = hex::encode(blake2b_128(secret.expose()));

    let event_id = ctx.emit_event(
        EmitSpec::new(EventPayload::TransitSecret {
            peer_id: peer_id.clone(),
            network_id,
            transit_key_id: transit_key_id.clone(),
            created_at: now_ms(),
        })
        .by(peer_id)
        .local_secret(secret.to_hex())
        .local_only(),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("transit_secret".to_string(), event_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"transit_key_id": transit_key_id}),
    })
}

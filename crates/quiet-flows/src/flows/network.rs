//! Network flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `network.create`: a new network rooted at the creating peer.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let name = str_or(params, "name", "My Network");

    let network_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Network {
            name: name.clone(),
            creator_id: peer_id.clone(),
            created_at: now_ms(),
        })
        .by(peer_id.clone())
        .deps(vec![DepSpec::concrete(EventKind::Peer, peer_id.clone())]),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("network".to_string(), network_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"network_id": network_id, "name": name, "creator_id": peer_id}),
    })
}

//! Channel flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, QuietError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `channel.create`: a channel inside an existing group.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let group_id = require_str(params, "group_id")?;
    let name = require_str(params, "name")?;

    let network_id = ctx
        .store()
        .state
        .groups
        .get(&group_id)
        .map(|row| row.network_id.clone())
        .ok_or_else(|| QuietError::not_found(format!("group {group_id}")))?;

    let channel_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Channel {
            group_id: group_id.clone(),
            name: name.clone(),
            network_id: network_id.clone(),
            creator_id: peer_id.clone(),
            created_at: now_ms(),
        })
        .by(peer_id)
        .deps(vec![DepSpec::concrete(EventKind::Group, group_id.clone())]),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("channel".to_string(), channel_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({
            "channel_id": channel_id,
            "group_id": group_id,
            "network_id": network_id,
            "name": name,
        }),
    })
}

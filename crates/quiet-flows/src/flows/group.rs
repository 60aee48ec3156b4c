//! Group flows.

use super::{new_key_event, public_key_of};
use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{EventPayload, Result};
use quiet_store::queries;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `group.create`: a new group plus its first symmetric key.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let network_id = require_str(params, "network_id")?;
    let name = require_str(params, "name")?;

    let group_id = ctx
        .emit_event(
            EmitSpec::new(EventPayload::Group {
                name: name.clone(),
                network_id: network_id.clone(),
                creator_id: peer_id.clone(),
                created_at: now_ms(),
            })
            .by(peer_id.clone()),
        )?
        .to_string();

    let public_key = public_key_of(ctx, &peer_id)?;
    let (key_event_id, _) =
        new_key_event(ctx, &peer_id, &group_id, &network_id, &peer_id, &public_key)?;

    let groups: Vec<Value> = queries::list_groups(ctx.store(), Some(&network_id))
        .into_iter()
        .map(|g| json!(g))
        .collect();

    let mut ids = BTreeMap::new();
    ids.insert("group".to_string(), group_id.clone());
    ids.insert("key".to_string(), key_event_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({
            "group_id": group_id,
            "name": name,
            "network_id": network_id,
            "creator_id": peer_id,
            "groups": groups,
        }),
    })
}

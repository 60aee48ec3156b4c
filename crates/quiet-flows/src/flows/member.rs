//! Member flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, Result};
use quiet_store::queries;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `member.create`: add an existing user to a group.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let group_id = require_str(params, "group_id")?;
    let user_id = require_str(params, "user_id")?;
    let network_id = require_str(params, "network_id")?;

    let member_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Member {
            group_id: group_id.clone(),
            user_id: user_id.clone(),
            added_by: peer_id.clone(),
            network_id,
            created_at: now_ms(),
        })
        .by(peer_id)
        .deps(vec![
            DepSpec::concrete(EventKind::Group, group_id.clone()),
            DepSpec::concrete(EventKind::User, user_id),
        ]),
    )?;

    let members: Vec<Value> = queries::list_members(ctx.store(), &group_id)
        .into_iter()
        .map(|m| json!(m))
        .collect();

    let mut ids = BTreeMap::new();
    ids.insert("member".to_string(), member_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({
            "group_id": group_id,
            "member_count": members.len(),
            "members": members,
        }),
    })
}

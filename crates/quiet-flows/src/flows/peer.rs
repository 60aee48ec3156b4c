//! Peer flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{EventPayload, QuietError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `peer.create`: bind an existing identity's key to a peer.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let identity_id = require_str(params, "identity_id")?;
    let username = str_or(params, "username", "User");

    let public_key = ctx
        .store()
        .state
        .identities
        .get(&identity_id)
        .map(|row| row.public_key.clone())
        .ok_or_else(|| QuietError::not_found(format!("identity {identity_id}")))?;

    let peer_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Peer {
            public_key,
            identity_id: identity_id.clone(),
            username: username.clone(),
            created_at: now_ms(),
        })
        .by(identity_id),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("peer".to_string(), peer_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"peer_id": peer_id, "username": username}),
    })
}

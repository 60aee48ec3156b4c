//! Message flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{require_str, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, QuietError, Result};
use quiet_store::queries;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `message.create`: post to a channel and return the recent history.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let channel_id = require_str(params, "channel_id")?;
    let content = require_str(params, "content")?;

    let (group_id, network_id) = ctx
        .store()
        .state
        .channels
        .get(&channel_id)
        .map(|row| (row.group_id.clone(), row.network_id.clone()))
        .ok_or_else(|| QuietError::not_found(format!("channel {channel_id}")))?;

    let message_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Message {
            channel_id: channel_id.clone(),
            group_id,
            network_id,
            peer_id: peer_id.clone(),
            content: content.clone(),
            created_at: now_ms(),
        })
        .by(peer_id.clone())
        .deps(vec![
            DepSpec::concrete(EventKind::Channel, channel_id.clone()),
            DepSpec::concrete(EventKind::Peer, peer_id.clone()),
        ]),
    )?;

    let messages: Vec<Value> = queries::list_messages(ctx.store(), &channel_id, 50)
        .into_iter()
        .map(|m| {
            let author_name = ctx
                .store()
                .state
                .users
                .values()
                .find(|u| u.peer_id == m.author_id)
                .map(|u| u.name.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            json!({
                "message_id": m.message_id,
                "content": m.content,
                "channel_id": m.channel_id,
                "author_id": m.author_id,
                "author_name": author_name,
                "created_at": m.created_at,
            })
        })
        .collect();

    let mut ids = BTreeMap::new();
    ids.insert("message".to_string(), message_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({
            "message_id": message_id,
            "channel_id": channel_id,
            "content": content,
            "messages": messages,
        }),
    })
}

//! Read-only query operations.
//!
//! Thin wrappers over the store's query surface, registered alongside
//! the mutating flows so the whole client surface is one `(op_id,
//! params)` map.

use crate::ctx::FlowCtx;
use crate::registry::{i64_or, require_str, FlowResponse};
use quiet_core::Result;
use quiet_store::queries;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn data_response(data: Value) -> FlowResponse {
    FlowResponse {
        ids: BTreeMap::new(),
        data,
    }
}

fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `identity.list`
pub fn list_identities(ctx: &mut FlowCtx<'_>, _params: &Value) -> Result<FlowResponse> {
    Ok(data_response(json!(queries::list_identities(ctx.store()))))
}

/// `peer.list`
pub fn list_peers(ctx: &mut FlowCtx<'_>, _params: &Value) -> Result<FlowResponse> {
    Ok(data_response(json!(queries::list_peers(ctx.store()))))
}

/// `network.list`
pub fn list_networks(ctx: &mut FlowCtx<'_>, _params: &Value) -> Result<FlowResponse> {
    Ok(data_response(json!(queries::list_networks(ctx.store()))))
}

/// `group.list`
pub fn list_groups(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let rows = queries::list_groups(ctx.store(), opt_str(params, "network_id"));
    Ok(data_response(json!(rows)))
}

/// `channel.list`
pub fn list_channels(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let rows = queries::list_channels(ctx.store(), opt_str(params, "group_id"));
    Ok(data_response(json!(rows)))
}

/// `user.list`
pub fn list_users(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let rows = queries::list_users(ctx.store(), opt_str(params, "network_id"));
    Ok(data_response(json!(rows)))
}

/// `member.list`
pub fn list_members(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let group_id = require_str(params, "group_id")?;
    Ok(data_response(json!(queries::list_members(
        ctx.store(),
        &group_id
    ))))
}

/// `message.list`
pub fn list_messages(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let channel_id = require_str(params, "channel_id")?;
    let limit = i64_or(params, "limit", 50).max(0) as usize;
    let rows = queries::list_messages(ctx.store(), &channel_id, limit);
    Ok(data_response(json!(rows)))
}

/// `key.list`
pub fn list_keys(ctx: &mut FlowCtx<'_>, _params: &Value) -> Result<FlowResponse> {
    Ok(data_response(json!(queries::list_keys(ctx.store()))))
}

/// `address.list`
pub fn list_addresses(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let rows = queries::list_addresses(ctx.store(), opt_str(params, "peer_id"));
    Ok(data_response(json!(rows)))
}

/// `system.dump`: every table, secrets redacted.
pub fn dump(ctx: &mut FlowCtx<'_>, _params: &Value) -> Result<FlowResponse> {
    Ok(data_response(queries::dump(ctx.store())))
}

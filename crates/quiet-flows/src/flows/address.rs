//! Address flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{i64_or, require_str, str_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{AddressAction, DepSpec, EventKind, EventPayload, QuietError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `address.announce`: register or remove a reachable address for a peer.
pub fn announce(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let ip = str_or(params, "ip", "127.0.0.1");
    let port = i64_or(params, "port", 5000);
    let network_id = str_or(params, "network_id", "");
    let action = match str_or(params, "action", "add").as_str() {
        "add" => AddressAction::Add,
        "remove" => AddressAction::Remove,
        other => return Err(QuietError::invalid(format!("unknown action: {other}"))),
    };

    let port = u16::try_from(port).map_err(|_| QuietError::invalid("port out of range"))?;
    let address_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Address {
            action,
            peer_id: peer_id.clone(),
            ip: ip.clone(),
            port,
            network_id,
            timestamp_ms: now_ms(),
        })
        .by(peer_id.clone())
        .deps(vec![DepSpec::concrete(EventKind::Peer, peer_id.clone())]),
    )?;

    let mut ids = BTreeMap::new();
    ids.insert("address".to_string(), address_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({"peer_id": peer_id, "ip": ip, "port": port}),
    })
}

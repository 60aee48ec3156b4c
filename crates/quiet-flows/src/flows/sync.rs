//! Sync request flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::registry::{i64_or, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{EventPayload, RequestId, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// `sync_request.run`: from each local identity, seal a sync request to
/// every other user of its networks. Requests are outgoing-only and
/// never stored.
pub fn run(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let since_ms = i64_or(params, "since_ms", 0);

    // (identity, network) pairs reachable through this node's users.
    let mut pairs: Vec<(String, String)> = Vec::new();
    for user in ctx.store().state.users.values() {
        let Some(peer) = ctx.store().state.peers.get(&user.peer_id) else {
            continue;
        };
        if !ctx
            .store()
            .state
            .identities
            .contains_key(&peer.identity_id)
        {
            continue;
        }
        let pair = (peer.identity_id.clone(), user.network_id.clone());
        if !user.network_id.is_empty() && !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }

    let mut sent = 0;
    for (identity_id, network_id) in pairs {
        let targets: Vec<String> = ctx
            .store()
            .state
            .users_in_network(&network_id)
            .into_iter()
            .filter(|user| {
                ctx.store()
                    .state
                    .peers
                    .get(&user.peer_id)
                    .map(|peer| peer.identity_id != identity_id)
                    .unwrap_or(true)
            })
            .map(|user| user.user_id.clone())
            .collect();

        for target in targets {
            ctx.emit_transient(
                EmitSpec::new(EventPayload::SyncRequest {
                    request_id: RequestId::generate().to_string(),
                    network_id: network_id.clone(),
                    from_identity: identity_id.clone(),
                    to_peer: target.clone(),
                    timestamp_ms: now_ms(),
                    last_sync_ms: since_ms,
                    sync_all: true,
                })
                .by(identity_id.clone())
                .seal_to(target)
                .outgoing(),
            )?;
            sent += 1;
        }
    }

    debug!(sent, "sync requests issued");
    Ok(FlowResponse {
        ids: BTreeMap::new(),
        data: json!({"sent": sent}),
    })
}

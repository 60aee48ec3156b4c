//! Invite flows.

use crate::ctx::{EmitSpec, FlowCtx};
use crate::invite_link::InviteLink;
use crate::registry::{require_str, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, EventKind, EventPayload, Result};
use quiet_crypto::invite::{derive_invite_pubkey, generate_invite_secret};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `invite.create`: mint an invite secret, store the grant as an event,
/// and return the shareable link.
pub fn create(ctx: &mut FlowCtx<'_>, params: &Value) -> Result<FlowResponse> {
    let peer_id = require_str(params, "peer_id")?;
    let network_id = require_str(params, "network_id")?;
    let group_id = require_str(params, "group_id")?;

    let invite_secret = generate_invite_secret();
    let invite_pubkey = derive_invite_pubkey(&invite_secret);

    let invite_id = ctx.emit_event(
        EmitSpec::new(EventPayload::Invite {
            invite_pubkey: invite_pubkey.clone(),
            invite_secret: invite_secret.clone(),
            network_id: network_id.clone(),
            group_id: group_id.clone(),
            inviter_id: peer_id.clone(),
            created_at: now_ms(),
        })
        .by(peer_id)
        .deps(vec![DepSpec::concrete(EventKind::Group, group_id.clone())]),
    )?;

    let link = InviteLink {
        invite_secret,
        network_id: network_id.clone(),
        group_id: group_id.clone(),
    }
    .encode()?;

    let mut ids = BTreeMap::new();
    ids.insert("invite".to_string(), invite_id.to_string());
    Ok(FlowResponse {
        ids,
        data: json!({
            "invite_link": link,
            "invite_id": invite_id,
            "invite_pubkey": invite_pubkey,
            "network_id": network_id,
            "group_id": group_id,
        }),
    })
}

//! Read-only query surface.
//!
//! Flows and response handlers read projected state exclusively through
//! these functions; nothing here mutates the store. Secret material never
//! appears in query output.

use crate::state::{
    AddressRow, ChannelRow, GroupMemberRow, GroupRow, IdentityRow, KeyRow, MessageRow, NetworkRow,
    PeerRow, UserRow,
};
use crate::store::Store;
use serde_json::{json, Value};

/// All local identities.
pub fn list_identities(store: &Store) -> Vec<&IdentityRow> {
    store.state.identities.values().collect()
}

/// All known peers.
pub fn list_peers(store: &Store) -> Vec<&PeerRow> {
    store.state.peers.values().collect()
}

/// All known networks.
pub fn list_networks(store: &Store) -> Vec<&NetworkRow> {
    store.state.networks.values().collect()
}

/// Groups, optionally restricted to a network.
pub fn list_groups<'a>(store: &'a Store, network_id: Option<&str>) -> Vec<&'a GroupRow> {
    store
        .state
        .groups
        .values()
        .filter(|g| network_id.map_or(true, |n| g.network_id == n))
        .collect()
}

/// Channels, optionally restricted to a group.
pub fn list_channels<'a>(store: &'a Store, group_id: Option<&str>) -> Vec<&'a ChannelRow> {
    store
        .state
        .channels
        .values()
        .filter(|c| group_id.map_or(true, |g| c.group_id == g))
        .collect()
}

/// Users, optionally restricted to a network.
pub fn list_users<'a>(store: &'a Store, network_id: Option<&str>) -> Vec<&'a UserRow> {
    store
        .state
        .users
        .values()
        .filter(|u| network_id.map_or(true, |n| u.network_id == n))
        .collect()
}

/// Members of a group.
pub fn list_members<'a>(store: &'a Store, group_id: &str) -> Vec<&'a GroupMemberRow> {
    store
        .state
        .group_members
        .get(group_id)
        .map(|members| members.values().collect())
        .unwrap_or_default()
}

/// Messages in a channel, oldest first, most recent `limit`.
pub fn list_messages<'a>(store: &'a Store, channel_id: &str, limit: usize) -> Vec<&'a MessageRow> {
    let rows = store.state.messages_in_channel(channel_id);
    let skip = rows.len().saturating_sub(limit);
    rows.into_iter().skip(skip).collect()
}

/// Announced key events (metadata only).
pub fn list_keys(store: &Store) -> Vec<&KeyRow> {
    store.state.keys.values().collect()
}

/// Addresses, optionally restricted to a peer.
pub fn list_addresses<'a>(store: &'a Store, peer_id: Option<&str>) -> Vec<&'a AddressRow> {
    store
        .state
        .addresses
        .iter()
        .filter(|(peer, _)| peer_id.map_or(true, |p| peer.as_str() == p))
        .flat_map(|(_, rows)| rows.iter())
        .collect()
}

/// Dump every table as JSON for inspection. Invite secrets and all key
/// material are redacted.
pub fn dump(store: &Store) -> Value {
    let invites: Vec<Value> = store
        .state
        .invites
        .values()
        .map(|invite| {
            let mut value = json!(invite);
            value["invite_secret"] = json!("<redacted>");
            value
        })
        .collect();

    let events: Vec<Value> = store
        .events
        .iter()
        .map(|row| {
            json!({
                "event_id": row.event_id,
                "type": row.event_type,
                "network_id": row.network_id,
                "peer_id": row.peer_id,
                "created_at": row.created_at,
            })
        })
        .collect();

    json!({
        "events": events,
        "identities": store.state.identities.values().collect::<Vec<_>>(),
        "peers": store.state.peers.values().collect::<Vec<_>>(),
        "networks": store.state.networks.values().collect::<Vec<_>>(),
        "groups": store.state.groups.values().collect::<Vec<_>>(),
        "channels": store.state.channels.values().collect::<Vec<_>>(),
        "users": store.state.users.values().collect::<Vec<_>>(),
        "group_members": store
            .state
            .group_members
            .values()
            .flat_map(|m| m.values())
            .collect::<Vec<_>>(),
        "messages": store.state.messages.values().collect::<Vec<_>>(),
        "invites": invites,
        "addresses": store
            .state
            .addresses
            .values()
            .flatten()
            .collect::<Vec<_>>(),
        "keys": store.state.keys.values().collect::<Vec<_>>(),
        "blocked": store.blocked.len(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::state::InviteRow;

    #[test]
    fn test_dump_redacts_invite_secret() {
        let mut store = Store::new();
        store.state.invites.insert(
            "pub1".into(),
            InviteRow {
                invite_id: "i1".into(),
                invite_pubkey: "pub1".into(),
                invite_secret: "very-secret".into(),
                network_id: "n1".into(),
                group_id: "g1".into(),
                inviter_id: "p1".into(),
                created_at: 1,
            },
        );
        let dumped = serde_json::to_string(&dump(&store)).expect("dump");
        assert!(!dumped.contains("very-secret"));
        assert!(dumped.contains("<redacted>"));
    }

    #[test]
    fn test_message_limit_keeps_most_recent() {
        let mut store = Store::new();
        for (id, at) in [("m1", 10), ("m2", 20), ("m3", 30)] {
            store.state.messages.insert(
                id.into(),
                MessageRow {
                    message_id: id.into(),
                    channel_id: "c1".into(),
                    group_id: "g1".into(),
                    network_id: "n1".into(),
                    author_id: "p1".into(),
                    content: id.into(),
                    created_at: at,
                },
            );
        }
        let rows = list_messages(&store, "c1", 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message_id, "m2");
        assert_eq!(rows[1].message_id, "m3");
    }
}

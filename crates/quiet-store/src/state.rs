//! Projected relational state.
//!
//! One table per event type, kept in insertion order. The projector owns
//! all writes; reads serve dependency resolution, membership checks,
//! outgoing recipient selection, and client queries. Inserts are keyed so
//! re-applying an already-projected event changes nothing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Local identity (public half only; the keypair lives in the secret store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRow {
    pub identity_id: String,
    pub name: String,
    pub public_key: String,
    pub created_at: i64,
}

/// A device/instance bound to a public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRow {
    pub peer_id: String,
    pub public_key: String,
    pub identity_id: String,
    pub username: String,
    pub created_at: i64,
}

/// Network root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRow {
    pub network_id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: i64,
}

/// Group within a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: String,
    pub name: String,
    pub network_id: String,
    pub creator_id: String,
    pub created_at: i64,
}

/// Channel within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRow {
    pub channel_id: String,
    pub group_id: String,
    pub name: String,
    pub network_id: String,
    pub creator_id: String,
    pub created_at: i64,
}

/// Peer joined to a network (and optionally a group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub peer_id: String,
    pub network_id: String,
    pub group_id: String,
    pub name: String,
    pub created_at: i64,
}

/// Group membership entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberRow {
    pub group_id: String,
    pub user_id: String,
    pub peer_id: String,
    pub added_by: String,
    pub created_at: i64,
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub message_id: String,
    pub channel_id: String,
    pub group_id: String,
    pub network_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: i64,
}

/// Invite grant, including the shared secret (the invites table is local
/// and lets members derive the joiner's bootstrap key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteRow {
    pub invite_id: String,
    pub invite_pubkey: String,
    pub invite_secret: String,
    pub network_id: String,
    pub group_id: String,
    pub inviter_id: String,
    pub created_at: i64,
}

/// Announced peer address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRow {
    pub peer_id: String,
    pub ip: String,
    pub port: u16,
    pub network_id: String,
    pub timestamp_ms: i64,
}

impl AddressRow {
    /// `ip:port` form used as a transport destination.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Announced key event (metadata only; the secret sits in the secret store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRow {
    pub event_id: String,
    pub key_id: String,
    pub group_id: String,
    pub network_id: String,
    pub peer_id: String,
    pub recipient_id: String,
    pub created_at: i64,
}

/// All projection tables.
#[derive(Debug, Default)]
pub struct ProjectedState {
    /// identity_id -> row
    pub identities: IndexMap<String, IdentityRow>,
    /// peer_id -> row
    pub peers: IndexMap<String, PeerRow>,
    /// network_id -> row
    pub networks: IndexMap<String, NetworkRow>,
    /// group_id -> row
    pub groups: IndexMap<String, GroupRow>,
    /// channel_id -> row
    pub channels: IndexMap<String, ChannelRow>,
    /// user_id -> row
    pub users: IndexMap<String, UserRow>,
    /// group_id -> user_id -> row
    pub group_members: IndexMap<String, IndexMap<String, GroupMemberRow>>,
    /// message_id -> row
    pub messages: IndexMap<String, MessageRow>,
    /// invite_pubkey -> row (lookups come from joiner proofs)
    pub invites: IndexMap<String, InviteRow>,
    /// peer_id -> addresses
    pub addresses: IndexMap<String, Vec<AddressRow>>,
    /// key event_id -> row
    pub keys: IndexMap<String, KeyRow>,
}

impl ProjectedState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group member (idempotent per `(group, user)`).
    pub fn add_group_member(&mut self, row: GroupMemberRow) {
        self.group_members
            .entry(row.group_id.clone())
            .or_default()
            .entry(row.user_id.clone())
            .or_insert(row);
    }

    /// Remove a group member.
    pub fn remove_group_member(&mut self, group_id: &str, user_id: &str) {
        if let Some(members) = self.group_members.get_mut(group_id) {
            members.shift_remove(user_id);
        }
    }

    /// Is the peer currently a member of the group? The creator is an
    /// implicit member.
    pub fn is_group_member(&self, group_id: &str, peer_id: &str) -> bool {
        if let Some(group) = self.groups.get(group_id) {
            if group.creator_id == peer_id {
                return true;
            }
        }
        self.group_members
            .get(group_id)
            .map(|members| members.values().any(|m| m.peer_id == peer_id))
            .unwrap_or(false)
    }

    /// Is the peer known to the network (joined as a user, or its creator)?
    pub fn is_network_peer(&self, network_id: &str, peer_id: &str) -> bool {
        if let Some(network) = self.networks.get(network_id) {
            if network.creator_id == peer_id {
                return true;
            }
        }
        self.users
            .values()
            .any(|u| u.network_id == network_id && u.peer_id == peer_id)
    }

    /// Peer ids of all members of a group, creator included.
    pub fn member_peers(&self, group_id: &str) -> Vec<String> {
        let mut peers: Vec<String> = Vec::new();
        if let Some(group) = self.groups.get(group_id) {
            peers.push(group.creator_id.clone());
        }
        if let Some(members) = self.group_members.get(group_id) {
            for member in members.values() {
                if !peers.contains(&member.peer_id) {
                    peers.push(member.peer_id.clone());
                }
            }
        }
        peers
    }

    /// Current addresses of a peer.
    pub fn addresses_for_peer(&self, peer_id: &str) -> &[AddressRow] {
        self.addresses
            .get(peer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Register an announced address (idempotent per endpoint).
    pub fn add_address(&mut self, row: AddressRow) {
        let entries = self.addresses.entry(row.peer_id.clone()).or_default();
        if !entries
            .iter()
            .any(|a| a.ip == row.ip && a.port == row.port)
        {
            entries.push(row);
        }
    }

    /// Deregister an address.
    pub fn remove_address(&mut self, peer_id: &str, ip: &str, port: u16) {
        if let Some(entries) = self.addresses.get_mut(peer_id) {
            entries.retain(|a| !(a.ip == ip && a.port == port));
        }
    }

    /// Messages of a channel, oldest first.
    pub fn messages_in_channel(&self, channel_id: &str) -> Vec<&MessageRow> {
        let mut rows: Vec<&MessageRow> = self
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .collect();
        rows.sort_by_key(|m| m.created_at);
        rows
    }

    /// Users of a network.
    pub fn users_in_network(&self, network_id: &str) -> Vec<&UserRow> {
        self.users
            .values()
            .filter(|u| u.network_id == network_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(group: &str, user: &str, peer: &str) -> GroupMemberRow {
        GroupMemberRow {
            group_id: group.into(),
            user_id: user.into(),
            peer_id: peer.into(),
            added_by: "creator".into(),
            created_at: 1,
        }
    }

    #[test]
    fn test_creator_is_implicit_member() {
        let mut state = ProjectedState::new();
        state.groups.insert(
            "g1".into(),
            GroupRow {
                group_id: "g1".into(),
                name: "general".into(),
                network_id: "n1".into(),
                creator_id: "alice".into(),
                created_at: 1,
            },
        );
        assert!(state.is_group_member("g1", "alice"));
        assert!(!state.is_group_member("g1", "bob"));
    }

    #[test]
    fn test_member_add_remove() {
        let mut state = ProjectedState::new();
        state.add_group_member(member("g1", "u-bob", "bob"));
        assert!(state.is_group_member("g1", "bob"));

        // Idempotent re-add keeps a single entry.
        state.add_group_member(member("g1", "u-bob", "bob"));
        assert_eq!(state.group_members["g1"].len(), 1);

        state.remove_group_member("g1", "u-bob");
        assert!(!state.is_group_member("g1", "bob"));
    }

    #[test]
    fn test_address_dedup_and_remove() {
        let mut state = ProjectedState::new();
        let row = AddressRow {
            peer_id: "p1".into(),
            ip: "10.0.0.1".into(),
            port: 5000,
            network_id: "n1".into(),
            timestamp_ms: 1,
        };
        state.add_address(row.clone());
        state.add_address(row.clone());
        assert_eq!(state.addresses_for_peer("p1").len(), 1);
        assert_eq!(state.addresses_for_peer("p1")[0].endpoint(), "10.0.0.1:5000");

        state.remove_address("p1", "10.0.0.1", 5000);
        assert!(state.addresses_for_peer("p1").is_empty());
    }

    #[test]
    fn test_messages_sorted_by_time() {
        let mut state = ProjectedState::new();
        for (id, at) in [("m2", 20), ("m1", 10)] {
            state.messages.insert(
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
        let rows = state.messages_in_channel("c1");
        assert_eq!(rows[0].message_id, "m1");
        assert_eq!(rows[1].message_id, "m2");
    }
}

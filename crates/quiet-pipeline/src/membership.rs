//! Membership and validation handler.
//!
//! Runs after signature verification. Checks per-kind structural
//! requirements, then the authorization fact: group-scoped events must
//! come from a current member (the creator is an implicit member),
//! network-scoped events from a known network peer, and a joining user
//! must present a valid invite proof. A missing fact that is itself an
//! event not yet arrived blocks the envelope; a present-but-negative
//! fact drops it.

use crate::handler::Handler;
use quiet_core::{Envelope, EventPayload, Result};
use quiet_crypto::invite::verify_invite_signature;
use quiet_store::Store;
use tracing::debug;

/// Validates structure and membership, setting the `validated` gate.
pub struct MembershipHandler;

impl Handler for MembershipHandler {
    fn name(&self) -> &'static str {
        "membership"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.validated.is_none()
            && env.sig_checked == Some(true)
            && env.event_plaintext.is_some()
    }

    fn process(&self, env: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>> {
        let Some(event) = env.event_plaintext.clone() else {
            return Ok(vec![]);
        };

        if let Err(reason) = structurally_valid(&event.payload) {
            env.fail(format!("malformed {} event: {reason}", event.kind()));
            return Ok(vec![]);
        }

        match check_authorization(env, store, &event.payload) {
            Check::Valid { group_member } => {
                env.validated = Some(true);
                if group_member {
                    env.is_group_member = Some(true);
                }
            }
            Check::Blocked(missing) => park(env, store, missing),
            Check::Denied(reason) => {
                debug!(kind = %event.kind(), reason = %reason, "authorization denied");
                env.fail(reason);
            }
        }
        Ok(vec![])
    }
}

enum Check {
    Valid { group_member: bool },
    Blocked(String),
    Denied(String),
}

fn check_authorization(env: &Envelope, store: &Store, payload: &EventPayload) -> Check {
    match payload {
        EventPayload::Identity { .. }
        | EventPayload::Peer { .. }
        | EventPayload::Network { .. }
        | EventPayload::SyncRequest { .. }
        | EventPayload::TransitSecret { .. }
        | EventPayload::Key { .. } => Check::Valid {
            group_member: false,
        },

        EventPayload::Group {
            network_id,
            creator_id,
            ..
        } => {
            if !store.state.networks.contains_key(network_id) {
                return missing_fact(env, format!("network:{network_id}"));
            }
            if store.state.is_network_peer(network_id, creator_id) {
                Check::Valid {
                    group_member: false,
                }
            } else {
                Check::Denied(format!("group creator {creator_id} unknown to network"))
            }
        }

        EventPayload::Channel {
            group_id,
            creator_id,
            ..
        } => require_member(env, store, group_id, creator_id),

        EventPayload::Invite {
            group_id,
            inviter_id,
            ..
        } => require_member(env, store, group_id, inviter_id),

        EventPayload::Member {
            group_id,
            user_id,
            added_by,
            ..
        } => {
            if !store.state.users.contains_key(user_id) {
                return missing_fact(env, format!("user:{user_id}"));
            }
            require_member(env, store, group_id, added_by)
        }

        EventPayload::User {
            peer_id,
            network_id,
            invite_pubkey,
            invite_signature,
            ..
        } => check_user(env, store, peer_id, network_id, invite_pubkey, invite_signature),

        EventPayload::Message {
            channel_id,
            group_id,
            peer_id,
            ..
        } => {
            let Some(channel) = store.state.channels.get(channel_id) else {
                return missing_fact(env, format!("channel:{channel_id}"));
            };
            if !group_id.is_empty() && &channel.group_id != group_id {
                return Check::Denied(format!(
                    "message group {group_id} does not match channel group {}",
                    channel.group_id
                ));
            }
            require_member(env, store, &channel.group_id.clone(), peer_id)
        }

        EventPayload::Address { peer_id, .. } => {
            if store.state.peers.contains_key(peer_id) {
                Check::Valid {
                    group_member: false,
                }
            } else {
                missing_fact(env, format!("peer:{peer_id}"))
            }
        }
    }
}

fn check_user(
    env: &Envelope,
    store: &Store,
    peer_id: &str,
    network_id: &str,
    invite_pubkey: &Option<String>,
    invite_signature: &Option<String>,
) -> Check {
    let Some(pubkey) = invite_pubkey else {
        // No invite proof: acceptable for a network's own founder path.
        return Check::Valid {
            group_member: true,
        };
    };
    let Some(invite) = store.state.invites.get(pubkey) else {
        // A joiner cannot hold the invite event it is redeeming; the
        // proof is checked by every member that does hold it.
        if env.self_created {
            return Check::Valid { group_member: true };
        }
        return missing_fact(env, format!("invite:{pubkey}"));
    };
    let Some(peer) = store.state.peers.get(peer_id) else {
        return missing_fact(env, format!("peer:{peer_id}"));
    };
    let Some(claimed) = invite_signature else {
        return Check::Denied("user event missing invite signature".into());
    };
    if invite.network_id != network_id {
        return Check::Denied("invite is for a different network".into());
    }
    if verify_invite_signature(claimed, &invite.invite_secret, &peer.public_key, network_id) {
        Check::Valid {
            group_member: true,
        }
    } else {
        Check::Denied("invalid invite signature".into())
    }
}

/// Group membership requirement shared by channel/invite/member/message.
fn require_member(env: &Envelope, store: &Store, group_id: &str, peer_id: &str) -> Check {
    if !store.state.groups.contains_key(group_id) {
        return missing_fact(env, format!("group:{group_id}"));
    }
    if store.state.is_group_member(group_id, peer_id) {
        Check::Valid { group_member: true }
    } else {
        Check::Denied(format!("sender {peer_id} is not a member of group {group_id}"))
    }
}

/// A missing fact blocks a received envelope (the event may still
/// arrive) but is a hard error for a locally authored one.
fn missing_fact(env: &Envelope, key: String) -> Check {
    if env.self_created {
        Check::Denied(format!("missing local fact: {key}"))
    } else {
        Check::Blocked(key)
    }
}

/// Park a received envelope on a missing fact, mirroring the resolver.
fn park(env: &mut Envelope, store: &mut Store, missing: String) {
    let Some(blocked_id) = env.event_id.clone() else {
        env.fail(format!("cannot block without event id (missing {missing})"));
        return;
    };
    debug!(event_id = %blocked_id, missing = %missing, "blocking on missing fact");
    env.missing_deps = vec![missing.clone()];
    let mut parked = env.clone();
    parked.resolved_deps.clear();
    // Re-run resolution and validation from scratch on readmission.
    parked.deps_included_and_valid = None;
    parked.sig_checked = None;
    parked.validated = None;
    store.blocked.block(blocked_id, parked, vec![missing]);
    env.should_remove = true;
}

/// Per-kind structural requirements (non-empty fields, sane timestamps).
fn structurally_valid(payload: &EventPayload) -> std::result::Result<(), String> {
    fn required(field: &str, value: &str) -> std::result::Result<(), String> {
        if value.is_empty() {
            Err(format!("missing {field}"))
        } else {
            Ok(())
        }
    }
    fn positive(field: &str, value: i64) -> std::result::Result<(), String> {
        if value <= 0 {
            Err(format!("non-positive {field}"))
        } else {
            Ok(())
        }
    }

    match payload {
        EventPayload::Identity {
            identity_id,
            public_key,
            created_at,
            ..
        } => {
            required("identity_id", identity_id)?;
            required("public_key", public_key)?;
            positive("created_at", *created_at)
        }
        EventPayload::Peer {
            public_key,
            identity_id,
            created_at,
            ..
        } => {
            required("public_key", public_key)?;
            required("identity_id", identity_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::Network {
            name,
            creator_id,
            created_at,
        } => {
            required("name", name)?;
            required("creator_id", creator_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::Group {
            name,
            network_id,
            creator_id,
            created_at,
        } => {
            required("name", name)?;
            required("network_id", network_id)?;
            required("creator_id", creator_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::Channel {
            group_id,
            name,
            creator_id,
            created_at,
            ..
        } => {
            required("group_id", group_id)?;
            required("name", name)?;
            required("creator_id", creator_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::User {
            peer_id,
            network_id,
            created_at,
            ..
        } => {
            required("peer_id", peer_id)?;
            required("network_id", network_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::Member {
            group_id,
            user_id,
            added_by,
            created_at,
            ..
        } => {
            required("group_id", group_id)?;
            required("user_id", user_id)?;
            required("added_by", added_by)?;
            positive("created_at", *created_at)
        }
        EventPayload::Invite {
            invite_pubkey,
            invite_secret,
            network_id,
            group_id,
            inviter_id,
            created_at,
        } => {
            required("invite_pubkey", invite_pubkey)?;
            required("invite_secret", invite_secret)?;
            required("network_id", network_id)?;
            required("group_id", group_id)?;
            required("inviter_id", inviter_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::Key {
            key_id,
            peer_id,
            recipient_id,
            sealed_secret,
            created_at,
            ..
        } => {
            required("key_id", key_id)?;
            required("peer_id", peer_id)?;
            required("recipient_id", recipient_id)?;
            required("sealed_secret", sealed_secret)?;
            positive("created_at", *created_at)
        }
        EventPayload::Message {
            channel_id,
            peer_id,
            created_at,
            ..
        } => {
            required("channel_id", channel_id)?;
            required("peer_id", peer_id)?;
            positive("created_at", *created_at)
        }
        EventPayload::Address {
            peer_id,
            ip,
            timestamp_ms,
            ..
        } => {
            required("peer_id", peer_id)?;
            required("ip", ip)?;
            positive("timestamp_ms", *timestamp_ms)
        }
        EventPayload::SyncRequest {
            request_id,
            network_id,
            from_identity,
            to_peer,
            timestamp_ms,
            ..
        } => {
            required("request_id", request_id)?;
            required("network_id", network_id)?;
            required("from_identity", from_identity)?;
            required("to_peer", to_peer)?;
            positive("timestamp_ms", *timestamp_ms)
        }
        EventPayload::TransitSecret {
            peer_id,
            transit_key_id,
            created_at,
            ..
        } => {
            required("peer_id", peer_id)?;
            required("transit_key_id", transit_key_id)?;
            positive("created_at", *created_at)
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use quiet_core::Event;
    use quiet_store::GroupRow;

    fn message_envelope(peer: &str) -> Envelope {
        let event = Event::new(
            EventPayload::Message {
                channel_id: "c1".into(),
                group_id: "g1".into(),
                network_id: "n1".into(),
                peer_id: peer.into(),
                content: "hi".into(),
                created_at: 1,
            },
            vec![],
        );
        let mut env = Envelope::from_event(event);
        env.sig_checked = Some(true);
        env.deps_included_and_valid = Some(true);
        env
    }

    fn store_with_channel() -> Store {
        let mut store = Store::new();
        store.state.groups.insert(
            "g1".into(),
            GroupRow {
                group_id: "g1".into(),
                name: "general".into(),
                network_id: "n1".into(),
                creator_id: "alice".into(),
                created_at: 1,
            },
        );
        store.state.channels.insert(
            "c1".into(),
            quiet_store::ChannelRow {
                channel_id: "c1".into(),
                group_id: "g1".into(),
                name: "general".into(),
                network_id: "n1".into(),
                creator_id: "alice".into(),
                created_at: 1,
            },
        );
        store
    }

    #[test]
    fn test_member_message_validates() {
        let mut store = store_with_channel();
        let mut env = message_envelope("alice");
        MembershipHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert_eq!(env.validated, Some(true));
        assert_eq!(env.is_group_member, Some(true));
    }

    #[test]
    fn test_non_member_message_denied() {
        let mut store = store_with_channel();
        let mut env = message_envelope("mallory");
        MembershipHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env.error.as_deref().is_some_and(|e| e.contains("not a member")));
    }

    #[test]
    fn test_missing_channel_blocks_received() {
        let mut store = Store::new();
        let mut env = message_envelope("alice");
        env.self_created = false;
        env.event_id = Some(quiet_core::EventId::new("m1"));
        MembershipHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env.should_remove);
        assert!(env.error.is_none());
        assert!(store.blocked.contains(&quiet_core::EventId::new("m1")));
    }

    #[test]
    fn test_structural_failure_is_error() {
        let mut store = Store::new();
        let event = Event::new(
            EventPayload::Message {
                channel_id: String::new(),
                group_id: "g1".into(),
                network_id: "n1".into(),
                peer_id: "p".into(),
                content: "hi".into(),
                created_at: 1,
            },
            vec![],
        );
        let mut env = Envelope::from_event(event);
        env.sig_checked = Some(true);
        env.deps_included_and_valid = Some(true);
        MembershipHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env.error.as_deref().is_some_and(|e| e.contains("malformed")));
    }
}

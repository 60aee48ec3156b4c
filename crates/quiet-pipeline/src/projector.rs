//! Projector: the only writer of the event store and projected state.
//!
//! Within one transaction-equivalent pass: dedup by event id, insert the
//! log row, apply the kind-specific projection (a pure function of event
//! and current state), signal the blocked queue, and re-emit any
//! envelopes the new event unblocked.
//!
//! Row ids come from the event id: a peer row's `peer_id` *is* its peer
//! event's id, and likewise for networks, groups, channels, users, and
//! messages.

use crate::handler::Handler;
use quiet_core::{AddressAction, Envelope, EventKind, EventPayload, Result};
use quiet_store::{
    AddressRow, ChannelRow, GroupMemberRow, GroupRow, IdentityRow, InsertOutcome, InviteRow,
    KeyRow, MessageRow, NetworkRow, PeerRow, Store, StoredEvent, UserRow,
};
use tracing::{debug, warn};

/// Applies validated events to the store and projections.
pub struct ProjectorHandler;

impl Handler for ProjectorHandler {
    fn name(&self) -> &'static str {
        "projector"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.validated == Some(true)
            && !env.stored
            && env.event_id.is_some()
            && env.event_plaintext.is_some()
            && env.event_type != Some(EventKind::SyncRequest)
    }

    fn process(&self, env: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>> {
        let (Some(event_id), Some(event)) = (env.event_id.clone(), env.event_plaintext.clone())
        else {
            return Ok(vec![]);
        };

        // Idempotent: an already-stored event changes nothing.
        if store.events.contains(&event_id) {
            env.stored = true;
            env.projected = true;
            return Ok(vec![]);
        }

        let canonical_bytes = match event.canonical_signed() {
            Ok(bytes) => bytes,
            Err(e) => {
                env.fail(format!("{e}"));
                return Ok(vec![]);
            }
        };

        let row = StoredEvent {
            event_id: event_id.clone(),
            event_type: event.kind(),
            network_id: event
                .payload
                .network_id()
                .map(str::to_string)
                .or_else(|| env.network_id.clone()),
            peer_id: event.payload.author().map(str::to_string),
            created_at: created_at_of(&event.payload),
            event: event.clone(),
            canonical_bytes,
            ciphertext: env.event_ciphertext.clone(),
        };
        if store.events.insert(row) == InsertOutcome::Duplicate {
            env.stored = true;
            env.projected = true;
            return Ok(vec![]);
        }

        let mut satisfied = vec![format!("{}:{}", event.kind(), event_id)];
        project(store, &event_id.to_string(), &event.payload, &mut satisfied);

        env.stored = true;
        env.projected = true;
        debug!(event_id = %event_id, kind = %event.kind(), "stored and projected");

        let readmitted = store.blocked.on_stored(&satisfied);
        if !readmitted.is_empty() {
            debug!(count = readmitted.len(), "readmitting blocked envelopes");
        }
        Ok(readmitted)
    }
}

/// Kind-specific projection. Appends extra satisfied reference keys
/// (invite pubkeys, key ids) for blocked-queue signaling.
fn project(store: &mut Store, event_id: &str, payload: &EventPayload, satisfied: &mut Vec<String>) {
    match payload {
        EventPayload::Identity {
            identity_id,
            name,
            public_key,
            created_at,
            ..
        } => {
            store.state.identities.insert(
                identity_id.clone(),
                IdentityRow {
                    identity_id: identity_id.clone(),
                    name: name.clone(),
                    public_key: public_key.clone(),
                    created_at: *created_at,
                },
            );
            satisfied.push(format!("identity:{identity_id}"));
        }

        EventPayload::Peer {
            public_key,
            identity_id,
            username,
            created_at,
        } => {
            store.state.peers.insert(
                event_id.to_string(),
                PeerRow {
                    peer_id: event_id.to_string(),
                    public_key: public_key.clone(),
                    identity_id: identity_id.clone(),
                    username: username.clone(),
                    created_at: *created_at,
                },
            );
        }

        EventPayload::Network {
            name,
            creator_id,
            created_at,
        } => {
            store.state.networks.insert(
                event_id.to_string(),
                NetworkRow {
                    network_id: event_id.to_string(),
                    name: name.clone(),
                    creator_id: creator_id.clone(),
                    created_at: *created_at,
                },
            );
        }

        EventPayload::Group {
            name,
            network_id,
            creator_id,
            created_at,
        } => {
            store.state.groups.insert(
                event_id.to_string(),
                GroupRow {
                    group_id: event_id.to_string(),
                    name: name.clone(),
                    network_id: network_id.clone(),
                    creator_id: creator_id.clone(),
                    created_at: *created_at,
                },
            );
        }

        EventPayload::Channel {
            group_id,
            name,
            network_id,
            creator_id,
            created_at,
        } => {
            store.state.channels.insert(
                event_id.to_string(),
                ChannelRow {
                    channel_id: event_id.to_string(),
                    group_id: group_id.clone(),
                    name: name.clone(),
                    network_id: network_id.clone(),
                    creator_id: creator_id.clone(),
                    created_at: *created_at,
                },
            );
        }

        EventPayload::User {
            peer_id,
            network_id,
            group_id,
            name,
            created_at,
            ..
        } => {
            store.state.users.insert(
                event_id.to_string(),
                UserRow {
                    user_id: event_id.to_string(),
                    peer_id: peer_id.clone(),
                    network_id: network_id.clone(),
                    group_id: group_id.clone(),
                    name: name.clone(),
                    created_at: *created_at,
                },
            );
            if !group_id.is_empty() {
                store.state.add_group_member(GroupMemberRow {
                    group_id: group_id.clone(),
                    user_id: event_id.to_string(),
                    peer_id: peer_id.clone(),
                    added_by: peer_id.clone(),
                    created_at: *created_at,
                });
            }
        }

        EventPayload::Member {
            group_id,
            user_id,
            added_by,
            created_at,
            ..
        } => {
            let peer_id = store
                .state
                .users
                .get(user_id)
                .map(|user| user.peer_id.clone());
            match peer_id {
                Some(peer_id) => store.state.add_group_member(GroupMemberRow {
                    group_id: group_id.clone(),
                    user_id: user_id.clone(),
                    peer_id,
                    added_by: added_by.clone(),
                    created_at: *created_at,
                }),
                None => warn!(user_id = %user_id, "member event for unknown user"),
            }
        }

        EventPayload::Invite {
            invite_pubkey,
            invite_secret,
            network_id,
            group_id,
            inviter_id,
            created_at,
        } => {
            store.state.invites.insert(
                invite_pubkey.clone(),
                InviteRow {
                    invite_id: event_id.to_string(),
                    invite_pubkey: invite_pubkey.clone(),
                    invite_secret: invite_secret.clone(),
                    network_id: network_id.clone(),
                    group_id: group_id.clone(),
                    inviter_id: inviter_id.clone(),
                    created_at: *created_at,
                },
            );
            satisfied.push(format!("invite:{invite_pubkey}"));
        }

        EventPayload::Key {
            key_id,
            group_id,
            network_id,
            peer_id,
            recipient_id,
            created_at,
            ..
        } => {
            store.state.keys.insert(
                event_id.to_string(),
                KeyRow {
                    event_id: event_id.to_string(),
                    key_id: key_id.clone(),
                    group_id: group_id.clone(),
                    network_id: network_id.clone(),
                    peer_id: peer_id.clone(),
                    recipient_id: recipient_id.clone(),
                    created_at: *created_at,
                },
            );
            satisfied.push(format!("key:{key_id}"));
        }

        EventPayload::Message {
            channel_id,
            group_id,
            network_id,
            peer_id,
            content,
            created_at,
        } => {
            store.state.messages.insert(
                event_id.to_string(),
                MessageRow {
                    message_id: event_id.to_string(),
                    channel_id: channel_id.clone(),
                    group_id: group_id.clone(),
                    network_id: network_id.clone(),
                    author_id: peer_id.clone(),
                    content: content.clone(),
                    created_at: *created_at,
                },
            );
        }

        EventPayload::Address {
            action,
            peer_id,
            ip,
            port,
            network_id,
            timestamp_ms,
        } => match action {
            AddressAction::Add => store.state.add_address(AddressRow {
                peer_id: peer_id.clone(),
                ip: ip.clone(),
                port: *port,
                network_id: network_id.clone(),
                timestamp_ms: *timestamp_ms,
            }),
            AddressAction::Remove => store.state.remove_address(peer_id, ip, *port),
        },

        // Sync requests are filtered out before projection.
        EventPayload::SyncRequest { .. } => {}

        EventPayload::TransitSecret { .. } => {
            // Announcement only; the secret went into the secret store.
        }
    }
}

fn created_at_of(payload: &EventPayload) -> i64 {
    match payload {
        EventPayload::Identity { created_at, .. }
        | EventPayload::Peer { created_at, .. }
        | EventPayload::Network { created_at, .. }
        | EventPayload::Group { created_at, .. }
        | EventPayload::Channel { created_at, .. }
        | EventPayload::User { created_at, .. }
        | EventPayload::Member { created_at, .. }
        | EventPayload::Invite { created_at, .. }
        | EventPayload::Key { created_at, .. }
        | EventPayload::Message { created_at, .. }
        | EventPayload::TransitSecret { created_at, .. } => *created_at,
        EventPayload::Address { timestamp_ms, .. }
        | EventPayload::SyncRequest { timestamp_ms, .. } => *timestamp_ms,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use quiet_core::{Event, EventId};

    fn validated_envelope(payload: EventPayload, id: &str) -> Envelope {
        let mut env = Envelope::from_event(Event::new(payload, vec![]));
        env.event_id = Some(EventId::new(id));
        env.validated = Some(true);
        env.sig_checked = Some(true);
        env.deps_included_and_valid = Some(true);
        env.event_ciphertext = Some(vec![1, 2, 3]);
        env
    }

    fn message_payload() -> EventPayload {
        EventPayload::Message {
            channel_id: "c1".into(),
            group_id: "g1".into(),
            network_id: "n1".into(),
            peer_id: "p1".into(),
            content: "hello".into(),
            created_at: 5,
        }
    }

    #[test]
    fn test_projects_and_marks_stored() {
        let mut store = Store::new();
        let mut env = validated_envelope(message_payload(), "m1");
        ProjectorHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(env.stored);
        assert!(env.projected);
        assert!(store.events.contains(&EventId::new("m1")));
        assert_eq!(store.state.messages.len(), 1);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut store = Store::new();
        let mut env = validated_envelope(message_payload(), "m1");
        ProjectorHandler
            .process(&mut env, &mut store)
            .expect("process");

        let mut replay = validated_envelope(message_payload(), "m1");
        replay.stored = false;
        ProjectorHandler
            .process(&mut replay, &mut store)
            .expect("process");
        assert!(replay.stored);
        assert!(replay.error.is_none());
        assert_eq!(store.events.len(), 1);
        assert_eq!(store.state.messages.len(), 1);
    }

    #[test]
    fn test_storing_readmits_blocked() {
        let mut store = Store::new();
        let waiting = Envelope {
            event_id: Some(EventId::new("waiting")),
            ..Envelope::default()
        };
        store
            .blocked
            .block(EventId::new("waiting"), waiting, vec!["message:m1".into()]);

        let mut env = validated_envelope(message_payload(), "m1");
        let readmitted = ProjectorHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert_eq!(readmitted.len(), 1);
        assert!(store.blocked.is_empty());
    }

    #[test]
    fn test_key_event_signals_key_id() {
        let mut store = Store::new();
        let mut env = validated_envelope(
            EventPayload::Key {
                key_id: "k1".into(),
                group_id: "g1".into(),
                network_id: "n1".into(),
                peer_id: "p1".into(),
                recipient_id: "p2".into(),
                sealed_secret: "ab".into(),
                created_at: 5,
            },
            "kev1",
        );
        let waiting = Envelope {
            event_id: Some(EventId::new("w")),
            ..Envelope::default()
        };
        store
            .blocked
            .block(EventId::new("w"), waiting, vec!["key:k1".into()]);

        let readmitted = ProjectorHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert_eq!(readmitted.len(), 1);
    }
}

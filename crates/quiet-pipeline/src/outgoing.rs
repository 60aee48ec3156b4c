//! Outgoing handler: recipient selection and send scheduling.
//!
//! For each stored (or sealed one-way) event, choose recipient peers,
//! clone one stripped envelope per known address, and re-inject the
//! clones so transit encryption runs. Clones carry only the event-layer
//! ciphertext and routing fields: no plaintext, no resolved deps, no
//! key material.

use crate::handler::Handler;
use quiet_core::time::now_ms;
use quiet_core::{Envelope, EventKind, EventPayload, KeyRef, Result};
use quiet_store::Store;
use tracing::debug;

/// Fans a stored event out to its recipients.
pub struct OutgoingHandler;

impl Handler for OutgoingHandler {
    fn name(&self) -> &'static str {
        "outgoing"
    }

    fn filter(&self, env: &Envelope) -> bool {
        !env.outgoing_checked
            && env.is_outgoing != Some(false)
            && !env.local_only
            && (env.stored || (env.is_outgoing == Some(true) && env.event_sealed.is_some()))
    }

    fn process(&self, env: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>> {
        env.outgoing_checked = true;

        let recipients = select_recipients(env, store);
        if recipients.is_empty() {
            return Ok(vec![]);
        }

        let Some(transit_key_id) = store.secrets.latest_transit().map(|r| r.id.clone()) else {
            debug!("no transit key; outgoing fan-out skipped");
            return Ok(vec![]);
        };

        let ciphertext = env
            .event_ciphertext
            .clone()
            .or_else(|| env.event_sealed.clone());
        let Some(ciphertext) = ciphertext else {
            return Ok(vec![]);
        };
        let key_ref = env.key_ref.clone().or_else(|| {
            env.seal_to
                .as_ref()
                .map(|target| KeyRef::Peer { id: target.clone() })
        });

        let now = now_ms();
        let mut clones = Vec::new();
        for peer_id in recipients {
            for address in store.state.addresses_for_peer(&peer_id) {
                clones.push(Envelope {
                    event_ciphertext: Some(ciphertext.clone()),
                    key_ref: key_ref.clone(),
                    event_id: env.event_id.clone(),
                    event_type: env.event_type,
                    network_id: env.network_id.clone(),
                    transit_key_id: Some(transit_key_id.clone()),
                    dest_address: Some(address.endpoint()),
                    due_at: Some(now),
                    request_id: env.request_id.clone(),
                    outgoing_checked: true,
                    is_outgoing: Some(true),
                    ..Envelope::default()
                });
            }
        }
        if !clones.is_empty() {
            debug!(event_id = ?env.event_id, count = clones.len(), "scheduled outgoing");
        }
        Ok(clones)
    }
}

/// Recipient peers for an event: the target peer for peer-targeted
/// kinds, group members for group events, network users otherwise.
fn select_recipients(env: &Envelope, store: &Store) -> Vec<String> {
    let author = env.peer_id.clone().unwrap_or_default();

    if let Some(event) = &env.event_plaintext {
        match &event.payload {
            EventPayload::Key { recipient_id, .. } => {
                return resolve_peer(store, recipient_id).into_iter().collect();
            }
            EventPayload::SyncRequest { to_peer, .. } => {
                return resolve_peer(store, to_peer).into_iter().collect();
            }
            _ => {}
        }
    } else if env.event_type == Some(EventKind::SyncRequest) {
        if let Some(target) = &env.seal_to {
            return resolve_peer(store, target).into_iter().collect();
        }
    }

    if let Some(group_id) = env
        .event_plaintext
        .as_ref()
        .and_then(|e| e.payload.group_id())
        .or(env.group_id.as_deref())
    {
        return store
            .state
            .member_peers(group_id)
            .into_iter()
            .filter(|peer| peer != &author)
            .collect();
    }

    if let Some(network_id) = env
        .event_plaintext
        .as_ref()
        .and_then(|e| e.payload.network_id())
        .or(env.network_id.as_deref())
    {
        let mut peers: Vec<String> = Vec::new();
        for user in store.state.users_in_network(network_id) {
            if user.peer_id != author && !peers.contains(&user.peer_id) {
                peers.push(user.peer_id.clone());
            }
        }
        return peers;
    }

    Vec::new()
}

/// Normalize a peer/user/identity reference to a peer id.
fn resolve_peer(store: &Store, id: &str) -> Option<String> {
    if store.state.peers.contains_key(id) {
        return Some(id.to_string());
    }
    if let Some(user) = store.state.users.get(id) {
        return Some(user.peer_id.clone());
    }
    None
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use quiet_core::{Event, EventId};
    use quiet_crypto::generate_secret;
    use quiet_store::{AddressRow, GroupMemberRow, GroupRow, PeerRow, SecretKind, SecretRecord};

    fn seeded_store() -> Store {
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
        store.state.add_group_member(GroupMemberRow {
            group_id: "g1".into(),
            user_id: "u-bob".into(),
            peer_id: "bob".into(),
            added_by: "alice".into(),
            created_at: 1,
        });
        for peer in ["alice", "bob"] {
            store.state.peers.insert(
                peer.into(),
                PeerRow {
                    peer_id: peer.into(),
                    public_key: "00".into(),
                    identity_id: format!("id-{peer}"),
                    username: peer.into(),
                    created_at: 1,
                },
            );
            store.state.add_address(AddressRow {
                peer_id: peer.into(),
                ip: "10.0.0.1".into(),
                port: 5000,
                network_id: "n1".into(),
                timestamp_ms: 1,
            });
        }
        store.secrets.insert(SecretRecord {
            id: "ab".repeat(16),
            kind: SecretKind::TransitKey,
            scope: None,
            secret: generate_secret(),
            created_at: 1,
        });
        store
    }

    fn stored_message_envelope() -> Envelope {
        let event = Event::new(
            quiet_core::EventPayload::Message {
                channel_id: "c1".into(),
                group_id: "g1".into(),
                network_id: "n1".into(),
                peer_id: "alice".into(),
                content: "hi".into(),
                created_at: 1,
            },
            vec![],
        );
        let mut env = Envelope::from_event(event);
        env.peer_id = Some("alice".into());
        env.event_id = Some(EventId::new("m1"));
        env.event_ciphertext = Some(vec![1, 2, 3]);
        env.key_ref = Some(KeyRef::Key { id: "k1".into() });
        env.stored = true;
        env
    }

    #[test]
    fn test_group_event_targets_members_except_author() {
        let mut store = seeded_store();
        let mut env = stored_message_envelope();
        let clones = OutgoingHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].dest_address.as_deref(), Some("10.0.0.1:5000"));
        assert!(clones[0].event_plaintext.is_none());
        assert!(clones[0].local_secret.is_none());
        assert!(clones[0].resolved_deps.is_empty());
        assert!(env.outgoing_checked);
    }

    #[test]
    fn test_no_transit_key_means_no_fanout() {
        let mut store = seeded_store();
        store.secrets = Default::default();
        let mut env = stored_message_envelope();
        let clones = OutgoingHandler
            .process(&mut env, &mut store)
            .expect("process");
        assert!(clones.is_empty());
        assert!(env.outgoing_checked);
    }

    #[test]
    fn test_local_only_never_matches() {
        let mut env = stored_message_envelope();
        env.local_only = true;
        assert!(!OutgoingHandler.filter(&env));
    }
}

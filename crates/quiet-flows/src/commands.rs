//! Command batches: envelopes submitted together with `@generated:`
//! placeholders, resolved by the runner once the referenced events have
//! been produced within the same run.

use crate::invite_link::InviteLink;
use quiet_core::time::now_ms;
use quiet_core::{DepSpec, Envelope, Event, EventKind, EventPayload, QuietError, Result};
use quiet_crypto::invite::{derive_invite_key, derive_invite_pubkey, invite_signature};
use quiet_crypto::{event_id_for_public_key, Keypair};

/// Build the `user.join_as_user` batch: identity, then a peer whose id
/// the user event forward-references as `@generated:peer:0`.
pub fn join_as_user(invite_link: &str, name: &str) -> Result<Vec<Envelope>> {
    let invite = InviteLink::decode(invite_link)?;
    let invite_pubkey = derive_invite_pubkey(&invite.invite_secret);
    let invite_key_hex = derive_invite_key(&invite.invite_secret).to_hex();

    let keypair = Keypair::generate();
    let public_key = keypair.public_key_hex();
    let identity_id = event_id_for_public_key(
        &hex::decode(&public_key).map_err(|e| QuietError::crypto(format!("{e}")))?,
    )
    .to_string();

    let mut identity_env = Envelope::from_event(Event::new(
        EventPayload::Identity {
            identity_id: identity_id.clone(),
            name: name.to_string(),
            public_key: public_key.clone(),
            private_key: Some(keypair.private_key_hex()),
            created_at: now_ms(),
        },
        vec![],
    ));
    identity_env.peer_id = Some(identity_id.clone());
    identity_env.local_only = true;

    let mut peer_env = Envelope::from_event(Event::new(
        EventPayload::Peer {
            public_key: public_key.clone(),
            identity_id: identity_id.clone(),
            username: name.to_string(),
            created_at: now_ms(),
        },
        vec![],
    ));
    peer_env.peer_id = Some(identity_id);
    peer_env.encrypt_to = Some(invite_pubkey.clone());
    peer_env.local_secret = Some(invite_key_hex);
    peer_env.group_id = Some(invite.group_id.clone());
    peer_env.network_id = Some(invite.network_id.clone());

    let proof = invite_signature(&invite.invite_secret, &public_key, &invite.network_id);
    let mut user_env = Envelope::from_event(Event::new(
        EventPayload::User {
            peer_id: "@generated:peer:0".to_string(),
            network_id: invite.network_id.clone(),
            group_id: invite.group_id,
            name: name.to_string(),
            invite_pubkey: Some(invite_pubkey.clone()),
            invite_signature: Some(proof),
            created_at: now_ms(),
        },
        vec![DepSpec::Generated {
            kind: EventKind::Peer,
            index: 0,
        }],
    ));
    user_env.peer_id = Some("@generated:peer:0".to_string());
    user_env.encrypt_to = Some(invite_pubkey);
    user_env.network_id = Some(invite.network_id);

    Ok(vec![identity_env, peer_env, user_env])
}

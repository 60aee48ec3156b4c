//! Crypto handler: every encryption boundary in the pipeline.
//!
//! Operation is selected by envelope shape, in order:
//!
//! 1. *Wire parse*: split raw transport bytes into transit fields.
//! 2. *Transit decrypt*: outer AEAD off; reveals the event ciphertext,
//!    key ref, and network id; computes `event_id` from the ciphertext.
//! 3. *Seal* / *open*: one-way sealed-box traffic (sync requests).
//! 4. *Event decrypt/unseal*: inner layer off via symmetric key or KEM.
//! 5. *Event encrypt*: canonical bytes under the selected key; identity
//!    events bypass encryption and derive their id from the public key.
//! 6. *Transit encrypt*: wrap an outgoing envelope and hand the wire
//!    frame to the outbox, discarding all secret-bearing fields.
//!
//! Event-layer symmetric ciphertexts are `nonce (24 B) ‖ aead_ct`; the
//! event id hashes that whole blob, so every peer computes the same id.
//!
//! Key selection on encrypt: the envelope's `encrypt_to` hint (installing
//! `local_secret` on first use), else the latest group-scope key, else
//! the author's personal-scope key. Key material handed over by flows is
//! always stripped here, never stored on the envelope past this handler.

use crate::handler::Handler;
use crate::wire;
use quiet_core::time::now_ms;
use quiet_core::{Envelope, Event, EventKind, EventPayload, KeyRef, QuietError, Result};
use quiet_crypto::{aead, sealed, SecretBytes};
use quiet_crypto::{event_id_for_ciphertext, event_id_for_public_key, Keypair};
use quiet_store::{SecretKind, SecretRecord, Store};
use tracing::{debug, warn};

/// Handles transit and event encryption in both directions.
pub struct CryptoHandler;

impl Handler for CryptoHandler {
    fn name(&self) -> &'static str {
        "crypto"
    }

    fn filter(&self, env: &Envelope) -> bool {
        // Wire parse
        (env.raw_bytes.is_some() && env.transit_ciphertext.is_none() && env.event_ciphertext.is_none())
            // Transit decrypt
            || (env.transit_ciphertext.is_some()
                && env.transit_key_id.is_some()
                && env.key_ref.is_none()
                && env.event_ciphertext.is_none())
            // Seal one-way
            || (env.seal_to.is_some() && env.event_plaintext.is_some() && env.event_sealed.is_none())
            // Open sealed
            || (env.event_sealed.is_some() && env.event_plaintext.is_none() && env.seal_to.is_none())
            // Event decrypt/unseal
            || (env.deps_included_and_valid == Some(true)
                && env.key_ref.is_some()
                && env.event_plaintext.is_none()
                && env.event_ciphertext.is_some())
            // Event encrypt (self-created; received events arrive with ciphertext)
            || (env.validated == Some(true)
                && env.event_plaintext.is_some()
                && env.event_ciphertext.is_none()
                && env.event_id.is_none()
                && env.seal_to.is_none()
                && env.event_type != Some(EventKind::SyncRequest))
            // Transit encrypt
            || (env.outgoing_checked
                && env.event_ciphertext.is_some()
                && env.transit_key_id.is_some()
                && env.transit_ciphertext.is_none())
    }

    fn process(&self, env: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>> {
        if env.raw_bytes.is_some() && env.transit_ciphertext.is_none() && env.event_ciphertext.is_none()
        {
            parse_wire(env);
        } else if env.transit_ciphertext.is_some()
            && env.transit_key_id.is_some()
            && env.key_ref.is_none()
            && env.event_ciphertext.is_none()
        {
            decrypt_transit(env, store);
        } else if env.seal_to.is_some() && env.event_plaintext.is_some() && env.event_sealed.is_none()
        {
            seal_event(env, store);
        } else if env.event_sealed.is_some() && env.event_plaintext.is_none() && env.seal_to.is_none()
        {
            open_sealed_event(env, store);
        } else if env.deps_included_and_valid == Some(true)
            && env.key_ref.is_some()
            && env.event_plaintext.is_none()
            && env.event_ciphertext.is_some()
        {
            decrypt_event(env, store);
        } else if env.validated == Some(true)
            && env.event_plaintext.is_some()
            && env.event_ciphertext.is_none()
            && env.event_id.is_none()
        {
            encrypt_event(env, store);
        } else if env.outgoing_checked
            && env.event_ciphertext.is_some()
            && env.transit_key_id.is_some()
            && env.transit_ciphertext.is_none()
        {
            encrypt_transit(env, store);
        }
        Ok(vec![])
    }
}

/// Split raw transport bytes into transit fields.
fn parse_wire(env: &mut Envelope) {
    let Some(raw) = env.raw_bytes.take() else {
        return;
    };
    match wire::parse_frame(&raw) {
        Ok(frame) => {
            env.transit_key_id = Some(frame.transit_key_id);
            env.transit_nonce = Some(frame.transit_nonce);
            env.transit_ciphertext = Some(frame.transit_ciphertext);
        }
        Err(e) => env.fail(format!("malformed wire frame: {e}")),
    }
}

/// Outer AEAD off; reveal the event layer.
fn decrypt_transit(env: &mut Envelope, store: &mut Store) {
    let (Some(key_id), Some(ciphertext), Some(nonce)) = (
        env.transit_key_id.clone(),
        env.transit_ciphertext.clone(),
        env.transit_nonce.clone(),
    ) else {
        return;
    };

    let key = match store.secrets.transit_key(&key_id) {
        Ok(key) => key,
        Err(_) => {
            env.fail(format!("unknown transit key: {key_id}"));
            return;
        }
    };
    let plaintext = match aead::decrypt(&ciphertext, &key, &nonce) {
        Ok(p) => p,
        Err(_) => {
            env.fail("transit decrypt failed");
            return;
        }
    };
    let transit = match wire::TransitPlaintext::from_bytes(&plaintext) {
        Ok(t) => t,
        Err(e) => {
            env.fail(format!("malformed transit plaintext: {e}"));
            return;
        }
    };
    let event_ciphertext = match transit.ciphertext_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };

    env.event_id = Some(event_id_for_ciphertext(&event_ciphertext));
    env.event_ciphertext = Some(event_ciphertext);
    env.key_ref = Some(transit.key_ref);
    env.network_id = transit.network_id;
    debug!(event_id = ?env.event_id, "transit decrypted");
}

/// Inner layer off: symmetric decrypt or sealed-box unseal.
fn decrypt_event(env: &mut Envelope, store: &mut Store) {
    let Some(ciphertext) = env.event_ciphertext.clone() else {
        return;
    };
    let plaintext = match env.key_ref.clone() {
        Some(KeyRef::Key { id }) => {
            let key = match symmetric_key_or_derive(store, &id) {
                Ok(key) => key,
                Err(e) => {
                    env.fail(format!("event key unavailable: {e}"));
                    return;
                }
            };
            if ciphertext.len() <= aead::NONCE_LEN {
                env.fail("event ciphertext too short");
                return;
            }
            let (nonce, body) = ciphertext.split_at(aead::NONCE_LEN);
            match aead::decrypt(body, &key, nonce) {
                Ok(p) => p,
                Err(_) => {
                    env.fail("event decrypt failed");
                    return;
                }
            }
        }
        Some(KeyRef::Peer { id }) => {
            let keypair = match local_keypair_for(store, &id) {
                Ok(kp) => kp,
                Err(_) => {
                    env.fail(format!("sealed event not addressed to this node: {id}"));
                    return;
                }
            };
            match sealed::unseal(&ciphertext, &keypair) {
                Ok(p) => p,
                Err(_) => {
                    env.fail("sealed event unseal failed");
                    return;
                }
            }
        }
        None => return,
    };

    let event: Event = match serde_json::from_slice(&plaintext) {
        Ok(event) => event,
        Err(e) => {
            env.fail(format!("malformed event plaintext: {e}"));
            return;
        }
    };

    adopt_plaintext(env, event);

    match env.event_type {
        // Key events carry their own authentication (the KEM) and their
        // secret: install it now, keyed for later decrypt and re-sharing.
        Some(EventKind::Key) => {
            install_received_key(env, store);
            env.sig_checked = Some(true);
            env.validated = Some(true);
            env.deps_included_and_valid = Some(true);
        }
        // Sync requests are sealed, unsigned, and never stored.
        Some(EventKind::SyncRequest) => {
            env.sig_checked = Some(true);
            env.validated = Some(true);
            env.deps_included_and_valid = Some(true);
        }
        // Newly visible payload deps get a second resolver pass.
        _ => env.deps_included_and_valid = None,
    }
}

/// Copy scope fields out of a freshly decrypted event.
fn adopt_plaintext(env: &mut Envelope, event: Event) {
    env.event_type = Some(event.kind());
    env.peer_id = event.payload.author().map(str::to_string);
    if env.network_id.is_none() {
        env.network_id = event.payload.network_id().map(str::to_string);
    }
    env.group_id = event.payload.group_id().map(str::to_string);
    if let EventPayload::Message { channel_id, .. } = &event.payload {
        env.channel_id = Some(channel_id.clone());
    }
    env.event_plaintext = Some(event);
}

/// Unwrap the sealed secret of a received key event into the secret store.
fn install_received_key(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.clone() else {
        return;
    };
    let EventPayload::Key {
        key_id,
        group_id,
        peer_id,
        recipient_id,
        sealed_secret,
        created_at,
        ..
    } = &event.payload
    else {
        env.fail("key envelope without key payload");
        return;
    };

    let keypair = match local_keypair_for(store, recipient_id) {
        Ok(kp) => kp,
        Err(_) => {
            env.fail(format!("key event sealed to unknown recipient: {recipient_id}"));
            return;
        }
    };
    let sealed_bytes = match hex::decode(sealed_secret) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("sealed secret hex: {e}"));
            return;
        }
    };
    let secret = match sealed::unseal(&sealed_bytes, &keypair) {
        Ok(bytes) => SecretBytes::new(bytes),
        Err(_) => {
            env.fail("could not unseal key secret");
            return;
        }
    };

    let scope = if group_id.is_empty() {
        peer_id.clone()
    } else {
        group_id.clone()
    };
    store.secrets.insert(SecretRecord {
        id: key_id.clone(),
        kind: SecretKind::SymmetricKey,
        scope: Some(scope),
        secret,
        created_at: *created_at,
    });
    debug!(key_id = %key_id, "installed received key");
}

/// Seal a plaintext one-way to `seal_to` (sync requests).
fn seal_event(env: &mut Envelope, store: &mut Store) {
    let Some(target) = env.seal_to.clone() else {
        return;
    };
    let Some(event) = env.event_plaintext.take() else {
        return;
    };
    let public_key = match public_key_for(store, &target) {
        Ok(key) => key,
        Err(e) => {
            env.fail(format!("seal target unknown: {e}"));
            return;
        }
    };
    let bytes = match event.canonical_signed() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.event_plaintext = Some(event);
            env.fail(format!("{e}"));
            return;
        }
    };
    match sealed::seal(&bytes, &public_key) {
        Ok(blob) => {
            env.event_sealed = Some(blob);
            env.event_type = Some(event.kind());
        }
        Err(e) => {
            env.event_plaintext = Some(event);
            env.fail(format!("seal failed: {e}"));
        }
    }
}

/// Open an incoming sealed blob with any local identity.
fn open_sealed_event(env: &mut Envelope, store: &mut Store) {
    let Some(blob) = env.event_sealed.clone() else {
        return;
    };
    let identity_ids: Vec<String> = store.state.identities.keys().cloned().collect();
    for identity_id in identity_ids {
        let Ok(keypair) = store.secrets.keypair(&identity_id) else {
            continue;
        };
        if let Ok(plaintext) = sealed::unseal(&blob, &keypair) {
            match serde_json::from_slice::<Event>(&plaintext) {
                Ok(event) => {
                    adopt_plaintext(env, event);
                    if env.event_type == Some(EventKind::SyncRequest) {
                        // Sync requests are served, never stored.
                        env.sig_checked = Some(true);
                        env.validated = Some(true);
                        env.deps_included_and_valid = Some(true);
                    }
                    return;
                }
                Err(e) => {
                    env.fail(format!("malformed sealed payload: {e}"));
                    return;
                }
            }
        }
    }
    env.fail("sealed blob not addressed to this node");
}

/// Event-layer encryption for a validated, locally authored event.
fn encrypt_event(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.clone() else {
        return;
    };

    match &event.payload {
        EventPayload::Identity { .. } => encrypt_identity(env, store),
        EventPayload::Key { .. } => encrypt_key_event(env, store),
        _ => encrypt_symmetric(env, store),
    }
}

/// Identity events bypass encryption: the id is the hash of the public
/// key, and the keypair moves into the secret store.
fn encrypt_identity(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.as_mut() else {
        return;
    };
    let EventPayload::Identity {
        identity_id,
        public_key,
        private_key,
        created_at,
        ..
    } = &mut event.payload
    else {
        return;
    };

    let public_bytes = match hex::decode(&*public_key) {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("identity public key hex: {e}"));
            return;
        }
    };
    let Some(private_hex) = private_key.take() else {
        env.fail("identity event without private key");
        return;
    };
    let keypair = match Keypair::from_private_hex(&private_hex) {
        Ok(kp) => kp,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    if keypair.public_key_hex() != *public_key {
        env.fail("identity keypair mismatch");
        return;
    }

    store
        .secrets
        .insert_identity(identity_id, &keypair, *created_at);
    env.event_id = Some(event_id_for_public_key(&public_bytes));
    env.local_only = true;
    debug!(event_id = ?env.event_id, "identity registered");
}

/// Key events are sealed to their recipient, not symmetrically encrypted.
fn encrypt_key_event(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.clone() else {
        return;
    };
    let EventPayload::Key {
        key_id,
        group_id,
        peer_id,
        recipient_id,
        created_at,
        ..
    } = &event.payload
    else {
        return;
    };

    // The raw secret rides in from the flow; install it for local use.
    if let Some(secret_hex) = env.local_secret.take() {
        match SecretBytes::from_hex(&secret_hex) {
            Ok(secret) => {
                let scope = if group_id.is_empty() {
                    personal_scope(store, peer_id)
                } else {
                    group_id.clone()
                };
                store.secrets.insert(SecretRecord {
                    id: key_id.clone(),
                    kind: SecretKind::SymmetricKey,
                    scope: Some(scope),
                    secret,
                    created_at: *created_at,
                });
            }
            Err(e) => {
                env.fail(format!("{e}"));
                return;
            }
        }
    }

    let recipient_key = match public_key_for(store, recipient_id) {
        Ok(key) => key,
        Err(e) => {
            env.fail(format!("key recipient unknown: {e}"));
            return;
        }
    };
    let bytes = match event.canonical_signed() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    match sealed::seal(&bytes, &recipient_key) {
        Ok(ciphertext) => {
            env.event_id = Some(event_id_for_ciphertext(&ciphertext));
            env.event_ciphertext = Some(ciphertext);
            env.key_ref = Some(KeyRef::Peer {
                id: recipient_id.clone(),
            });
        }
        Err(e) => env.fail(format!("key seal failed: {e}")),
    }
}

/// Symmetric event encryption under the selected scope key.
fn encrypt_symmetric(env: &mut Envelope, store: &mut Store) {
    let Some(event) = env.event_plaintext.clone() else {
        return;
    };

    // A transit-secret event announces a key id; the material itself
    // rides the envelope and moves into the secret store here.
    if let EventPayload::TransitSecret {
        transit_key_id,
        created_at,
        ..
    } = &event.payload
    {
        if let Some(secret_hex) = env.local_secret.take() {
            match SecretBytes::from_hex(&secret_hex) {
                Ok(bytes) => store.secrets.insert(SecretRecord {
                    id: transit_key_id.clone(),
                    kind: SecretKind::TransitKey,
                    scope: None,
                    secret: bytes,
                    created_at: *created_at,
                }),
                Err(e) => {
                    env.fail(format!("{e}"));
                    return;
                }
            }
        }
    }
    let key_id = match select_key(env, store, &event) {
        Ok(id) => id,
        Err(e) => {
            env.fail(format!("no event key: {e}"));
            return;
        }
    };
    let key = match store.secrets.symmetric_key(&key_id) {
        Ok(key) => key,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    let bytes = match event.canonical_signed() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    match aead::encrypt(&bytes, &key) {
        Ok((body, nonce)) => {
            let mut ciphertext = Vec::with_capacity(aead::NONCE_LEN + body.len());
            ciphertext.extend_from_slice(&nonce);
            ciphertext.extend_from_slice(&body);
            env.event_id = Some(event_id_for_ciphertext(&ciphertext));
            env.event_ciphertext = Some(ciphertext);
            env.key_ref = Some(KeyRef::Key { id: key_id });
        }
        Err(e) => env.fail(format!("event encrypt failed: {e}")),
    }
}

/// Pick the event-layer key id: hint, then group scope, then personal.
fn select_key(env: &mut Envelope, store: &mut Store, event: &Event) -> Result<String> {
    if let Some(hint) = env.encrypt_to.clone() {
        if !store.secrets.contains(&hint) {
            let Some(secret_hex) = env.local_secret.take() else {
                return Err(QuietError::not_found(format!("hinted key: {hint}")));
            };
            // Hinted (invite-derived) keys are unscoped: usable by id
            // only, never picked up by scope selection below.
            store.secrets.insert(SecretRecord {
                id: hint.clone(),
                kind: SecretKind::SymmetricKey,
                scope: None,
                secret: SecretBytes::from_hex(&secret_hex)?,
                created_at: now_ms(),
            });
        }
        return Ok(hint);
    }

    if let Some(group_id) = event.payload.group_id() {
        return store
            .secrets
            .latest_symmetric_for_scope(group_id)
            .map(|record| record.id.clone())
            .ok_or_else(|| QuietError::not_found(format!("group key for {group_id}")));
    }

    let author = event
        .payload
        .author()
        .ok_or_else(|| QuietError::invalid("event has no author"))?;
    let scope = personal_scope(store, author);
    store
        .secrets
        .latest_symmetric_for_scope(&scope)
        .map(|record| record.id.clone())
        .ok_or_else(|| QuietError::not_found(format!("personal key for {scope}")))
}

/// Wrap an outgoing envelope in the transit layer and hand the wire
/// frame to the outbox. Everything secret-bearing is discarded.
fn encrypt_transit(env: &mut Envelope, store: &mut Store) {
    let (Some(key_id), Some(event_ciphertext)) =
        (env.transit_key_id.clone(), env.event_ciphertext.clone())
    else {
        return;
    };
    let Some(key_ref) = env.key_ref.clone() else {
        env.fail("outgoing envelope without key ref");
        return;
    };
    let key = match store.secrets.transit_key(&key_id) {
        Ok(key) => key,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };

    let transit = wire::TransitPlaintext {
        event_ciphertext: hex::encode(&event_ciphertext),
        key_ref,
        network_id: env.network_id.clone(),
    };
    let plaintext = match transit.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };
    let (ciphertext, nonce) = match aead::encrypt(&plaintext, &key) {
        Ok(pair) => pair,
        Err(e) => {
            env.fail(format!("transit encrypt failed: {e}"));
            return;
        }
    };
    let frame = match wire::build_frame(&key_id, &nonce, &ciphertext) {
        Ok(frame) => frame,
        Err(e) => {
            env.fail(format!("{e}"));
            return;
        }
    };

    store.push_outgoing(Envelope {
        transit_key_id: Some(key_id),
        transit_nonce: Some(nonce.to_vec()),
        transit_ciphertext: Some(ciphertext),
        raw_bytes: Some(frame),
        dest_address: env.dest_address.clone(),
        due_at: env.due_at,
        request_id: env.request_id.clone(),
        outgoing_checked: true,
        ..Envelope::default()
    });
    // The plaintext-bearing clone has served its purpose.
    env.should_remove = true;
}

/// The personal key scope of an author: its identity id, resolved
/// through the peers table or a public-key match when needed.
fn personal_scope(store: &Store, author: &str) -> String {
    if store.state.identities.contains_key(author) {
        return author.to_string();
    }
    if let Some(peer) = store.state.peers.get(author) {
        return peer.identity_id.clone();
    }
    if let Some(identity) = store
        .state
        .identities
        .values()
        .find(|row| row.public_key == author)
    {
        return identity.identity_id.clone();
    }
    author.to_string()
}

/// Hex public key of a peer, user, or identity reference.
fn public_key_for(store: &Store, id: &str) -> Result<String> {
    if let Some(peer) = store.state.peers.get(id) {
        return Ok(peer.public_key.clone());
    }
    if let Some(identity) = store.state.identities.get(id) {
        return Ok(identity.public_key.clone());
    }
    if let Some(user) = store.state.users.get(id) {
        if let Some(peer) = store.state.peers.get(&user.peer_id) {
            return Ok(peer.public_key.clone());
        }
    }
    Err(QuietError::not_found(format!("public key for {id}")))
}

/// Local keypair able to act as `id` (a peer or identity of this node).
fn local_keypair_for(store: &Store, id: &str) -> Result<Keypair> {
    if let Ok(keypair) = store.secrets.keypair(id) {
        return Ok(keypair);
    }
    let public_key = public_key_for(store, id)?;
    store.secrets.keypair_for_public(&public_key)
}

/// Symmetric key by id, deriving and installing the invite key when the
/// id matches a projected invite pubkey.
fn symmetric_key_or_derive(store: &mut Store, key_id: &str) -> Result<[u8; 32]> {
    if let Ok(key) = store.secrets.symmetric_key(key_id) {
        return Ok(key);
    }
    let Some(invite) = store.state.invites.get(key_id) else {
        return Err(QuietError::not_found(format!("symmetric key: {key_id}")));
    };
    // Derived invite keys stay unscoped: they decrypt a joiner's
    // bootstrap events by id but never encrypt anything of ours.
    let derived = quiet_crypto::invite::derive_invite_key(&invite.invite_secret);
    let record = SecretRecord {
        id: key_id.to_string(),
        kind: SecretKind::SymmetricKey,
        scope: None,
        secret: derived,
        created_at: invite.created_at,
    };
    warn!(key_id = %key_id, "derived event key from invite");
    store.secrets.insert(record);
    store.secrets.symmetric_key(key_id)
}

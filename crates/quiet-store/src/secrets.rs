//! Local secret store.
//!
//! Holds private key material keyed by id: identity keypairs, scoped
//! symmetric keys (group / personal / invite-derived), and transit
//! secrets. Only the crypto handler reads or writes it during pipeline
//! runs; flows hand generated material in via the envelope's
//! `local_secret` field.

use indexmap::IndexMap;
use quiet_core::{QuietError, Result};
use quiet_crypto::{Keypair, SecretBytes};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a secret is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Ed25519 private key of a local identity
    IdentityKey,
    /// Symmetric event-layer key (group, personal, or invite-derived)
    SymmetricKey,
    /// Symmetric transit-layer key
    TransitKey,
}

/// One secret record.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    /// Lookup id: identity id, key id, or transit key id
    pub id: String,
    /// What the secret is for
    pub kind: SecretKind,
    /// Scope of a symmetric key: a group id, or the author's peer id for
    /// personal-scope bootstrap keys
    pub scope: Option<String>,
    /// The material itself
    pub secret: SecretBytes,
    /// Creation timestamp (ms)
    pub created_at: i64,
}

/// Durable map of local secrets.
#[derive(Debug, Default)]
pub struct SecretStore {
    records: IndexMap<String, SecretRecord>,
    // public key hex -> identity id, for signing-key lookup
    identity_by_public: HashMap<String, String>,
}

impl SecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, record: SecretRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Insert an identity keypair, indexed by both id and public key.
    pub fn insert_identity(&mut self, identity_id: &str, keypair: &Keypair, created_at: i64) {
        self.identity_by_public
            .insert(keypair.public_key_hex(), identity_id.to_string());
        self.insert(SecretRecord {
            id: identity_id.to_string(),
            kind: SecretKind::IdentityKey,
            scope: None,
            secret: SecretBytes::new(keypair.signing_key().to_bytes().to_vec()),
            created_at,
        });
    }

    /// Fetch any record by id.
    pub fn get(&self, id: &str) -> Option<&SecretRecord> {
        self.records.get(id)
    }

    /// True if the id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Rebuild the signing keypair of a local identity.
    pub fn keypair(&self, identity_id: &str) -> Result<Keypair> {
        let record = self
            .records
            .get(identity_id)
            .filter(|r| r.kind == SecretKind::IdentityKey)
            .ok_or_else(|| QuietError::not_found(format!("identity secret: {identity_id}")))?;
        Keypair::from_private_hex(&record.secret.to_hex())
    }

    /// Rebuild the signing keypair whose public half matches.
    pub fn keypair_for_public(&self, public_key_hex: &str) -> Result<Keypair> {
        let identity_id = self
            .identity_by_public
            .get(public_key_hex)
            .ok_or_else(|| QuietError::not_found(format!("identity for key: {public_key_hex}")))?;
        self.keypair(identity_id)
    }

    /// A symmetric key by id, as a 32-byte array.
    pub fn symmetric_key(&self, key_id: &str) -> Result<[u8; 32]> {
        let record = self
            .records
            .get(key_id)
            .filter(|r| r.kind == SecretKind::SymmetricKey)
            .ok_or_else(|| QuietError::not_found(format!("symmetric key: {key_id}")))?;
        record.secret.as_key32()
    }

    /// Latest symmetric key for a scope (group id or peer id).
    pub fn latest_symmetric_for_scope(&self, scope: &str) -> Option<&SecretRecord> {
        self.records
            .values()
            .filter(|r| r.kind == SecretKind::SymmetricKey && r.scope.as_deref() == Some(scope))
            .max_by_key(|r| r.created_at)
    }

    /// A transit secret by id.
    pub fn transit_key(&self, transit_key_id: &str) -> Result<[u8; 32]> {
        let record = self
            .records
            .get(transit_key_id)
            .filter(|r| r.kind == SecretKind::TransitKey)
            .ok_or_else(|| QuietError::not_found(format!("transit key: {transit_key_id}")))?;
        record.secret.as_key32()
    }

    /// Latest locally held transit secret (used when sending).
    pub fn latest_transit(&self) -> Option<&SecretRecord> {
        self.records
            .values()
            .filter(|r| r.kind == SecretKind::TransitKey)
            .max_by_key(|r| r.created_at)
    }

    /// All symmetric records, for re-sealing to a new member.
    pub fn all_symmetric(&self) -> impl Iterator<Item = &SecretRecord> {
        self.records
            .values()
            .filter(|r| r.kind == SecretKind::SymmetricKey)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use quiet_crypto::generate_secret;

    #[test]
    fn test_identity_lookup_by_public_key() {
        let mut store = SecretStore::new();
        let keypair = Keypair::generate();
        store.insert_identity("id1", &keypair, 1);

        let found = store
            .keypair_for_public(&keypair.public_key_hex())
            .expect("keypair");
        assert_eq!(found.public_key_hex(), keypair.public_key_hex());
    }

    #[test]
    fn test_latest_symmetric_wins_per_scope() {
        let mut store = SecretStore::new();
        for (id, at) in [("k-old", 10), ("k-new", 20)] {
            store.insert(SecretRecord {
                id: id.into(),
                kind: SecretKind::SymmetricKey,
                scope: Some("g1".into()),
                secret: generate_secret(),
                created_at: at,
            });
        }
        let latest = store.latest_symmetric_for_scope("g1").expect("record");
        assert_eq!(latest.id, "k-new");
        assert!(store.latest_symmetric_for_scope("g2").is_none());
    }

    #[test]
    fn test_kind_mismatch_is_not_found() {
        let mut store = SecretStore::new();
        store.insert(SecretRecord {
            id: "t1".into(),
            kind: SecretKind::TransitKey,
            scope: None,
            secret: generate_secret(),
            created_at: 1,
        });
        assert!(store.transit_key("t1").is_ok());
        assert!(store.symmetric_key("t1").is_err());
    }
}

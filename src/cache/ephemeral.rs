//! Session-keyed encrypted in-memory index
//!
//! Every vault's [`SessionVaultRecord`] is serialized and encrypted with a key
//! and IV drawn from the CSPRNG when the index is created. Neither is derived
//! from a password and neither is ever written anywhere, so the fixed IV shared
//! by all entries stays confined to this process. The persistent cache never
//! uses this pattern.
//!
//! Each vault also gets a [`VaultSearchIndex`] of names and tags stamped with
//! the record generation it was built from. Values stay encrypted; value
//! search decrypts the record on demand.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::{CryptoBox, KeyMaterial, IV_SIZE};
use crate::domain::{MatchField, ResourceType, SearchHit, SessionVaultRecord};
use crate::errors::{Result, VaultdexError};
use crate::search::{self, MatchScore, Query, VaultSearchIndex};

#[derive(Debug)]
struct EncryptedEntry {
    ciphertext: Vec<u8>,
    generation: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    entries: HashMap<String, EncryptedEntry>,
    indexes: HashMap<String, VaultSearchIndex>,
    next_generation: u64,
}

/// Options for [`EphemeralSessionIndex::search`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSearchOptions {
    /// Also match secret and certificate values
    pub include_values: bool,
}

pub struct EphemeralSessionIndex {
    crypto: CryptoBox,
    key: KeyMaterial,
    iv: Zeroizing<[u8; IV_SIZE]>,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for EphemeralSessionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralSessionIndex")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

impl EphemeralSessionIndex {
    /// Create an empty index with a fresh session key and IV
    pub fn new() -> Result<Self> {
        Ok(Self {
            crypto: CryptoBox::default(),
            key: CryptoBox::generate_key()?,
            iv: Zeroizing::new(CryptoBox::generate_iv()?),
            state: RwLock::new(SessionState::default()),
        })
    }

    /// Store a vault's record, replacing any previous one.
    ///
    /// The vault's search index becomes stale until [`Self::rebuild_index`] runs.
    #[instrument(skip(self, record), fields(vault = %vault_identifier))]
    pub async fn set(&self, vault_identifier: &str, record: SessionVaultRecord) -> Result<u64> {
        let plaintext = Zeroizing::new(serde_json::to_vec(&record).map_err(|e| {
            VaultdexError::serialization("Failed to serialize session record", e)
        })?);
        let ciphertext = self.crypto.encrypt_with_iv(&plaintext, &self.key, &self.iv);

        let mut state = self.state.write().await;
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(vault_identifier.to_string(), EncryptedEntry { ciphertext, generation });

        debug!(generation, values = record.value_count(), "Stored session record");
        Ok(generation)
    }

    /// Decrypt one vault's record
    pub async fn get(&self, vault_identifier: &str) -> Result<Option<SessionVaultRecord>> {
        let state = self.state.read().await;
        state.entries.get(vault_identifier).map(|entry| self.decrypt(entry)).transpose()
    }

    fn decrypt(&self, entry: &EncryptedEntry) -> Result<SessionVaultRecord> {
        let plaintext = Zeroizing::new(self.crypto.decrypt(&entry.ciphertext, &self.key, &*self.iv)?);
        serde_json::from_slice(&plaintext).map_err(|e| {
            VaultdexError::decryption(format!("Session record is not valid: {}", e))
        })
    }

    pub async fn remove(&self, vault_identifier: &str) -> bool {
        let mut state = self.state.write().await;
        state.indexes.remove(vault_identifier);
        state.entries.remove(vault_identifier).is_some()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.indexes.clear();
    }

    /// Number of vaults held
    pub async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn vault_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether the vault's search index is missing or older than its record
    pub async fn is_stale(&self, vault_identifier: &str) -> bool {
        let state = self.state.read().await;
        match (state.entries.get(vault_identifier), state.indexes.get(vault_identifier)) {
            (Some(entry), Some(index)) => index.is_stale(entry.generation),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Rebuild the search index of one vault from its current record.
    ///
    /// Returns `false` when the vault is not held.
    #[instrument(skip(self), fields(vault = %vault_identifier))]
    pub async fn rebuild_index(&self, vault_identifier: &str) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(entry) = state.entries.get(vault_identifier) else {
            state.indexes.remove(vault_identifier);
            return Ok(false);
        };

        let generation = entry.generation;
        let record = self.decrypt(entry)?;
        let index = VaultSearchIndex::build(&record.record, generation);
        debug!(generation, resources = index.len(), "Rebuilt search index");
        state.indexes.insert(vault_identifier.to_string(), index);
        Ok(true)
    }

    /// Search names and tags of every vault, and values when requested.
    ///
    /// A vault whose index is stale is searched through a throwaway index
    /// built from its current record. Results are ranked.
    pub async fn search(&self, term: &str, options: SessionSearchOptions) -> Result<Vec<SearchHit>> {
        let Some(query) = Query::parse(term) else {
            return Ok(Vec::new());
        };

        let state = self.state.read().await;
        let mut hits = Vec::new();

        for (vault_identifier, entry) in &state.entries {
            let cached = state.indexes.get(vault_identifier).filter(|i| !i.is_stale(entry.generation));

            let needs_record = options.include_values || cached.is_none();
            let record = if needs_record { Some(self.decrypt(entry)?) } else { None };

            let mut vault_hits = match (cached, &record) {
                (Some(index), _) => index.search(&query),
                (None, Some(record)) => {
                    VaultSearchIndex::build(&record.record, entry.generation).search(&query)
                }
                (None, None) => Vec::new(),
            };

            if let (true, Some(record)) = (options.include_values, &record) {
                merge_value_hits(&mut vault_hits, record, &query);
            }

            hits.extend(vault_hits);
        }

        search::rank(&mut hits);
        Ok(hits)
    }
}

/// Score values at half weight and keep the better hit per resource
fn merge_value_hits(hits: &mut Vec<SearchHit>, record: &SessionVaultRecord, query: &Query) {
    for resource in record.record.resources() {
        let resource_type = resource.resource_type();
        if resource_type == ResourceType::Key {
            continue;
        }
        let Some(value) = record.value_of(resource_type, resource.name()) else {
            continue;
        };
        let Some(m) = search::score(query, value.expose_secret()).map(MatchScore::half_weight) else {
            continue;
        };

        let existing = hits
            .iter_mut()
            .find(|h| h.resource_type == resource_type && h.name == resource.name());
        match existing {
            Some(hit) if hit.score >= m.score => {}
            Some(hit) => {
                hit.score = m.score;
                hit.matched_on = MatchField::Value;
            }
            None => hits.push(SearchHit::new(
                record.vault_identifier(),
                resource.to_meta(),
                m.score,
                MatchField::Value,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CertMeta, KeyMeta, SecretMeta, SecretString, VaultRecord};

    fn session_record(vault: &str) -> SessionVaultRecord {
        let mut record = SessionVaultRecord::new(
            VaultRecord::new(vault)
                .with_secrets(vec![
                    SecretMeta::named("db-password").with_tag("team", "payments"),
                    SecretMeta::named("smtp-relay"),
                ])
                .with_keys(vec![KeyMeta::named("signing")])
                .with_certificates(vec![CertMeta::named("web-tls")]),
        );
        record.secret_values.insert("smtp-relay".into(), SecretString::new("postgres://db-host"));
        record
    }

    fn values() -> SessionSearchOptions {
        SessionSearchOptions { include_values: true }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let index = EphemeralSessionIndex::new().unwrap();
        index.set("kv-prod", session_record("kv-prod")).await.unwrap();

        let back = index.get("kv-prod").await.unwrap().unwrap();
        assert_eq!(back, session_record("kv-prod"));
        assert!(index.get("missing").await.unwrap().is_none());
        assert_eq!(index.size().await, 1);
    }

    #[tokio::test]
    async fn test_generation_staleness() {
        let index = EphemeralSessionIndex::new().unwrap();
        assert!(!index.is_stale("kv").await);

        index.set("kv", session_record("kv")).await.unwrap();
        assert!(index.is_stale("kv").await);

        assert!(index.rebuild_index("kv").await.unwrap());
        assert!(!index.is_stale("kv").await);

        index.set("kv", session_record("kv")).await.unwrap();
        assert!(index.is_stale("kv").await);
        assert!(!index.rebuild_index("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_stale_and_fresh_agree() {
        let index = EphemeralSessionIndex::new().unwrap();
        index.set("kv", session_record("kv")).await.unwrap();
        let stale = index.search("db", SessionSearchOptions::default()).await.unwrap();

        index.rebuild_index("kv").await.unwrap();
        let fresh = index.search("db", SessionSearchOptions::default()).await.unwrap();
        assert_eq!(stale, fresh);
        assert_eq!(fresh[0].name, "db-password");
    }

    #[tokio::test]
    async fn test_value_search_is_opt_in_and_half_weight() {
        let index = EphemeralSessionIndex::new().unwrap();
        index.set("kv", session_record("kv")).await.unwrap();
        index.rebuild_index("kv").await.unwrap();

        let without = index.search("postgres", SessionSearchOptions::default()).await.unwrap();
        assert!(without.iter().all(|h| h.matched_on != MatchField::Value));

        let with = index.search("postgres", values()).await.unwrap();
        let hit = with.iter().find(|h| h.name == "smtp-relay").unwrap();
        assert_eq!(hit.matched_on, MatchField::Value);
        assert_eq!(hit.score, 40);
    }

    #[tokio::test]
    async fn test_name_hit_outranks_value_hit_of_same_tier() {
        let index = EphemeralSessionIndex::new().unwrap();
        let mut record = SessionVaultRecord::new(
            VaultRecord::new("kv").with_secrets(vec![
                SecretMeta::named("alpha"),
                SecretMeta::named("token"),
            ]),
        );
        record.secret_values.insert("alpha".into(), SecretString::new("token"));
        index.set("kv", record).await.unwrap();

        let hits = index.search("token", values()).await.unwrap();
        assert_eq!(hits[0].name, "token");
        assert_eq!(hits[0].score, 100);
        assert_eq!(hits[1].name, "alpha");
        assert_eq!(hits[1].score, 50);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let index = EphemeralSessionIndex::new().unwrap();
        index.set("a", session_record("a")).await.unwrap();
        index.set("b", session_record("b")).await.unwrap();
        assert_eq!(index.vault_identifiers().await, vec!["a", "b"]);

        assert!(index.remove("a").await);
        assert!(!index.remove("a").await);
        index.clear().await;
        assert_eq!(index.size().await, 0);
        assert!(index.search("db", values()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query() {
        let index = EphemeralSessionIndex::new().unwrap();
        index.set("kv", session_record("kv")).await.unwrap();
        assert!(index.search("   ", values()).await.unwrap().is_empty());
    }
}

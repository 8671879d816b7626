//! Password-encrypted, metadata-only vault cache
//!
//! The whole `vault_identifier -> VaultRecord` map is serialized to JSON and
//! encrypted with a key derived from the user's password. Three files live in
//! the cache directory:
//!
//! - `cache.salt`: PBKDF2 salt, written once and reused until the cache is cleared
//! - `cache.iv`: CBC IV, replaced on every save
//! - `cache.dat`: the ciphertext
//!
//! The map only ever holds [`VaultRecord`]s, which have no field for secret
//! material.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn, Instrument};
use zeroize::Zeroizing;

use crate::crypto::{CryptoBox, KeyMaterial, SALT_SIZE};
use crate::domain::{MatchField, Resource, SearchHit, SecretString, VaultRecord};
use crate::errors::{Result, VaultdexError};
use crate::expiration::{self, ExpirationStatus};
use crate::search::{self, Query};

pub const SALT_FILE: &str = "cache.salt";
pub const IV_FILE: &str = "cache.iv";
pub const DATA_FILE: &str = "cache.dat";

/// Locations of the three cache artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFiles {
    pub dir: PathBuf,
    pub salt: PathBuf,
    pub iv: PathBuf,
    pub data: PathBuf,
}

impl CacheFiles {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self { salt: dir.join(SALT_FILE), iv: dir.join(IV_FILE), data: dir.join(DATA_FILE), dir }
    }

    fn all(&self) -> [&Path; 3] {
        [&self.salt, &self.iv, &self.data]
    }
}

/// Result of [`PersistentVaultCache::load`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// No cache on disk yet
    Fresh,
    Loaded { vaults: usize },
    /// The cache could not be read and was discarded
    Reset { reason: String },
}

/// Counts over the cached records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub vaults: usize,
    pub secrets: usize,
    pub keys: usize,
    pub certificates: usize,
    pub expired: usize,
    pub critical: usize,
    pub warning: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheState {
    vaults: HashMap<String, VaultRecord>,
    salt: Option<Vec<u8>>,
}

/// Durable multi-vault metadata store
#[derive(Debug)]
pub struct PersistentVaultCache {
    files: CacheFiles,
    crypto: CryptoBox,
    state: Mutex<CacheState>,
    /// Serializes load, save and clear so artifacts are never interleaved
    io_lock: Mutex<()>,
}

impl PersistentVaultCache {
    pub fn new(cache_dir: impl Into<PathBuf>, crypto: CryptoBox) -> Self {
        Self {
            files: CacheFiles::in_dir(cache_dir),
            crypto,
            state: Mutex::new(CacheState::default()),
            io_lock: Mutex::new(()),
        }
    }

    pub fn files(&self) -> &CacheFiles {
        &self.files
    }

    /// Replace the in-memory map with the on-disk cache.
    ///
    /// Never fails: a missing cache is `Fresh`, and a cache that cannot be read
    /// or decrypted is discarded and reported as `Reset`.
    #[instrument(skip(self, password), fields(dir = %self.files.dir.display()))]
    pub async fn load(&self, password: &SecretString) -> LoadOutcome {
        let _io = self.io_lock.lock().await;

        let artifacts = match self.read_artifacts().await {
            Ok(artifacts) => artifacts,
            Err(e) => return self.reset(None, e.to_string()).await,
        };

        let (salt, iv, data) = match artifacts {
            (Some(salt), Some(iv), Some(data)) => (salt, iv, data),
            (salt, _, _) => {
                debug!(has_salt = salt.is_some(), "No cache on disk, starting fresh");
                let mut state = self.state.lock().await;
                state.vaults.clear();
                state.salt = salt;
                return LoadOutcome::Fresh;
            }
        };

        let decoded = match self.derive(password, &salt).await {
            Ok(key) => self.decode(&key, &iv, &data),
            Err(e) => Err(e),
        };

        match decoded {
            Ok(vaults) => {
                let count = vaults.len();
                let mut state = self.state.lock().await;
                state.vaults = vaults;
                state.salt = Some(salt);
                info!(vaults = count, "Loaded vault cache");
                LoadOutcome::Loaded { vaults: count }
            }
            Err(e) => self.reset(Some(salt), e.to_string()).await,
        }
    }

    async fn reset(&self, salt: Option<Vec<u8>>, reason: String) -> LoadOutcome {
        warn!(reason = %reason, "Vault cache unreadable, starting with an empty cache");
        let mut state = self.state.lock().await;
        state.vaults.clear();
        state.salt = salt;
        LoadOutcome::Reset { reason }
    }

    fn decode(
        &self,
        key: &KeyMaterial,
        iv: &[u8],
        data: &[u8],
    ) -> Result<HashMap<String, VaultRecord>> {
        let plaintext = Zeroizing::new(self.crypto.decrypt(data, key, iv)?);
        serde_json::from_slice(&plaintext)
            .map_err(|e| VaultdexError::decryption(format!("Cache contents are not valid: {}", e)))
    }

    async fn read_artifacts(&self) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>, Option<Vec<u8>>)> {
        let salt = read_optional(&self.files.salt).await?;
        let iv = read_optional(&self.files.iv).await?;
        let data = read_optional(&self.files.data).await?;
        Ok((salt, iv, data))
    }

    /// Encrypt and write the whole map.
    ///
    /// On failure the in-memory map is left untouched.
    #[instrument(skip(self, password), fields(dir = %self.files.dir.display()))]
    pub async fn save(&self, password: &SecretString) -> Result<usize> {
        let _io = self.io_lock.lock().await;

        let (existing_salt, plaintext, count) = {
            let state = self.state.lock().await;
            let ordered: BTreeMap<&str, &VaultRecord> =
                state.vaults.iter().map(|(k, v)| (k.as_str(), v)).collect();
            let plaintext = Zeroizing::new(
                serde_json::to_vec(&ordered)
                    .map_err(|e| VaultdexError::serialization("Failed to serialize cache", e))?,
            );
            (state.salt.clone(), plaintext, state.vaults.len())
        };

        tokio::fs::create_dir_all(&self.files.dir).await.map_err(|e| {
            VaultdexError::persistence(
                format!("creating cache directory {}", self.files.dir.display()),
                e,
            )
        })?;

        let salt = match existing_salt {
            Some(salt) => salt,
            None => {
                let salt = CryptoBox::generate_salt(SALT_SIZE)?;
                write_atomic(&self.files.salt, &salt).await?;
                self.state.lock().await.salt = Some(salt.clone());
                debug!("Generated new cache salt");
                salt
            }
        };

        let key = self.derive(password, &salt).await?;
        let (ciphertext, iv) = self.crypto.encrypt(&plaintext, &key)?;

        write_atomic(&self.files.data, &ciphertext).await?;
        write_atomic(&self.files.iv, &iv).await?;

        info!(vaults = count, bytes = ciphertext.len(), "Saved vault cache");
        Ok(count)
    }

    async fn derive(&self, password: &SecretString, salt: &[u8]) -> Result<KeyMaterial> {
        let crypto = self.crypto;
        let password = password.clone();
        let salt = salt.to_vec();
        tokio::task::spawn_blocking(move || crypto.derive_key(password.expose_secret(), &salt))
            .await
            .map_err(|e| VaultdexError::internal(format!("Key derivation task failed: {}", e)))?
    }

    /// Replace the record of one vault
    pub async fn upsert(&self, vault_identifier: &str, mut record: VaultRecord) {
        record.vault_identifier = vault_identifier.to_string();
        debug!(vault = %vault_identifier, resources = record.resource_count(), "Upserting vault record");
        self.state.lock().await.vaults.insert(vault_identifier.to_string(), record);
    }

    pub async fn get(&self, vault_identifier: &str) -> Option<VaultRecord> {
        self.state.lock().await.vaults.get(vault_identifier).cloned()
    }

    pub async fn remove(&self, vault_identifier: &str) -> Option<VaultRecord> {
        self.state.lock().await.vaults.remove(vault_identifier)
    }

    /// Sorted identifiers of all cached vaults
    pub async fn vault_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().await.vaults.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.vaults.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.vaults.is_empty()
    }

    /// Match `term` against every resource name in every vault. Hits are unordered.
    pub async fn global_search(&self, term: &str) -> Vec<SearchHit> {
        let Some(query) = Query::parse(term) else {
            return Vec::new();
        };

        let span = crate::cache_span!("global_search", layer = "persistent");
        async {
            let state = self.state.lock().await;
            let hits: Vec<SearchHit> = state
                .vaults
                .values()
                .flat_map(|record| search::search_record(record, &query))
                .collect();
            debug!(vaults = state.vaults.len(), hits = hits.len(), "Scanned cached vaults");
            hits
        }
        .instrument(span)
        .await
    }

    /// Enabled certificates expiring within `days`, soonest first
    pub async fn expiring_certificates(&self, days: i64) -> Vec<SearchHit> {
        self.expiring_certificates_at(days, Utc::now()).await
    }

    pub async fn expiring_certificates_at(&self, days: i64, now: DateTime<Utc>) -> Vec<SearchHit> {
        let state = self.state.lock().await;
        let hits = state
            .vaults
            .values()
            .flat_map(|record| {
                record.certificates.iter().map(move |c| (record.vault_identifier.as_str(), c))
            })
            .filter(|(_, c)| c.enabled && expiration::expires_within(c.expires_on, now, days))
            .map(|(vault, c)| SearchHit::new(vault, c.to_meta(), 0, MatchField::None))
            .collect();
        sort_by_expiry(hits)
    }

    /// Enabled secrets expiring within `days`, soonest first
    pub async fn expiring_secrets(&self, days: i64) -> Vec<SearchHit> {
        self.expiring_secrets_at(days, Utc::now()).await
    }

    pub async fn expiring_secrets_at(&self, days: i64, now: DateTime<Utc>) -> Vec<SearchHit> {
        let state = self.state.lock().await;
        let hits = state
            .vaults
            .values()
            .flat_map(|record| {
                record.secrets.iter().map(move |s| (record.vault_identifier.as_str(), s))
            })
            .filter(|(_, s)| s.enabled && expiration::expires_within(s.expires_on, now, days))
            .map(|(vault, s)| SearchHit::new(vault, s.to_meta(), 0, MatchField::None))
            .collect();
        sort_by_expiry(hits)
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let state = self.state.lock().await;
        let mut stats = CacheStats { vaults: state.vaults.len(), ..Default::default() };

        for record in state.vaults.values() {
            stats.secrets += record.secrets.len();
            stats.keys += record.keys.len();
            stats.certificates += record.certificates.len();
            stats.last_indexed = stats.last_indexed.max(Some(record.last_indexed));

            let expiries = record
                .secrets
                .iter()
                .filter(|s| s.enabled)
                .map(|s| s.expires_on)
                .chain(record.certificates.iter().filter(|c| c.enabled).map(|c| c.expires_on));
            for expires_on in expiries {
                match expiration::classify(expires_on, now) {
                    ExpirationStatus::Expired => stats.expired += 1,
                    ExpirationStatus::Critical => stats.critical += 1,
                    ExpirationStatus::Warning => stats.warning += 1,
                    ExpirationStatus::Safe | ExpirationStatus::NoExpiration => {}
                }
            }
        }

        stats
    }

    /// Empty the map and delete every artifact. Missing files are fine.
    #[instrument(skip(self), fields(dir = %self.files.dir.display()))]
    pub async fn clear(&self) -> Result<()> {
        let _io = self.io_lock.lock().await;
        {
            let mut state = self.state.lock().await;
            state.vaults.clear();
            state.salt = None;
        }

        for path in self.files.all() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Removed cache artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(VaultdexError::persistence(
                        format!("removing {}", path.display()),
                        e,
                    ))
                }
            }
        }

        info!("Cleared vault cache");
        Ok(())
    }
}

fn sort_by_expiry(mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        a.expires_on()
            .cmp(&b.expires_on())
            .then_with(|| a.vault_identifier.cmp(&b.vault_identifier))
            .then_with(|| a.name.cmp(&b.name))
    });
    hits
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VaultdexError::persistence(format!("reading {}", path.display()), e)),
    }
}

/// Write through a sibling temp file and rename over the target
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.tmp", file_name));

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| VaultdexError::persistence(format!("writing {}", tmp.display()), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| VaultdexError::persistence(format!("replacing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CertMeta, KeyMeta, SecretMeta};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> PersistentVaultCache {
        PersistentVaultCache::new(dir.path(), CryptoBox::new(1_000))
    }

    fn password(p: &str) -> SecretString {
        SecretString::new(p)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_load_without_files_is_fresh() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        assert_eq!(cache.load(&password("pw")).await, LoadOutcome::Fresh);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let writer = cache(&dir);
        let record = VaultRecord::new("kv-prod")
            .with_secrets(vec![SecretMeta::named("db-password").with_tag("env", "prod")])
            .with_keys(vec![KeyMeta::named("signing")]);
        writer.upsert("kv-prod", record.clone()).await;
        assert_eq!(writer.save(&password("pw")).await.unwrap(), 1);

        let reader = cache(&dir);
        assert_eq!(reader.load(&password("pw")).await, LoadOutcome::Loaded { vaults: 1 });
        assert_eq!(reader.get("kv-prod").await, Some(record));
    }

    #[tokio::test]
    async fn test_wrong_password_resets() {
        let dir = TempDir::new().unwrap();
        let writer = cache(&dir);
        writer.upsert("kv-prod", VaultRecord::new("kv-prod")).await;
        writer.save(&password("right")).await.unwrap();

        let reader = cache(&dir);
        let outcome = reader.load(&password("wrong")).await;
        assert!(matches!(outcome, LoadOutcome::Reset { .. }));
        assert!(reader.is_empty().await);
    }

    #[tokio::test]
    async fn test_salt_is_stable_and_iv_changes() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.upsert("kv", VaultRecord::new("kv")).await;

        cache.save(&password("pw")).await.unwrap();
        let salt1 = std::fs::read(&cache.files().salt).unwrap();
        let iv1 = std::fs::read(&cache.files().iv).unwrap();

        cache.save(&password("pw")).await.unwrap();
        let salt2 = std::fs::read(&cache.files().salt).unwrap();
        let iv2 = std::fs::read(&cache.files().iv).unwrap();

        assert_eq!(salt1, salt2);
        assert_eq!(salt1.len(), SALT_SIZE);
        assert_ne!(iv1, iv2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_record() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache
            .upsert("kv", VaultRecord::new("kv").with_secrets(vec![SecretMeta::named("old")]))
            .await;
        cache
            .upsert("kv", VaultRecord::new("kv").with_secrets(vec![SecretMeta::named("new")]))
            .await;

        assert!(cache.global_search("old").await.is_empty());
        assert_eq!(cache.global_search("new").await.len(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expiring_certificates_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let now = now();
        cache
            .upsert(
                "kv-a",
                VaultRecord::new("kv-a").with_certificates(vec![
                    CertMeta::named("later").with_expiry(now + Duration::days(20)),
                    CertMeta::named("disabled").with_expiry(now + Duration::days(1)).disabled(),
                    CertMeta::named("far").with_expiry(now + Duration::days(200)),
                    CertMeta::named("never"),
                ]),
            )
            .await;
        cache
            .upsert(
                "kv-b",
                VaultRecord::new("kv-b").with_certificates(vec![
                    CertMeta::named("expired").with_expiry(now - Duration::days(3))
                ]),
            )
            .await;

        let names: Vec<String> = cache
            .expiring_certificates_at(30, now)
            .await
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["expired", "later"]);
    }

    #[tokio::test]
    async fn test_stats_counts_buckets() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let now = now();
        cache
            .upsert(
                "kv",
                VaultRecord::new("kv")
                    .with_secrets(vec![
                        SecretMeta::named("a").with_expiry(now - Duration::days(1)),
                        SecretMeta::named("b").with_expiry(now + Duration::days(45)),
                    ])
                    .with_certificates(vec![
                        CertMeta::named("c").with_expiry(now + Duration::days(10))
                    ]),
            )
            .await;

        let stats = cache.stats_at(now).await;
        assert_eq!(stats.vaults, 1);
        assert_eq!(stats.secrets, 2);
        assert_eq!(stats.certificates, 1);
        assert_eq!((stats.expired, stats.critical, stats.warning), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_clear_removes_artifacts_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.clear().await.unwrap();

        cache.upsert("kv", VaultRecord::new("kv")).await;
        cache.save(&password("pw")).await.unwrap();
        assert!(cache.files().data.exists());

        cache.clear().await.unwrap();
        assert!(cache.is_empty().await);
        for path in cache.files().all() {
            assert!(!path.exists());
        }
        assert_eq!(cache.load(&password("pw")).await, LoadOutcome::Fresh);
    }

    #[tokio::test]
    async fn test_corrupted_data_resets() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.upsert("kv", VaultRecord::new("kv")).await;
        cache.save(&password("pw")).await.unwrap();

        std::fs::write(&cache.files().data, b"not a ciphertext").unwrap();
        assert!(matches!(cache.load(&password("pw")).await, LoadOutcome::Reset { .. }));
    }
}

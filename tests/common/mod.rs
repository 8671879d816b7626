//! Common test utilities for all integration tests.
//!
//! Inventories, cache directories and configuration tuned for fast tests.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use vaultdex::config::AppConfig;
use vaultdex::crypto::CryptoBox;
use vaultdex::domain::{CertMeta, KeyMeta, SecretMeta, SecretString};
use vaultdex::source::{Inventory, InventoryDataSource, InventorySubscription, InventoryVault};

/// PBKDF2 iterations for tests; far below the production default
pub const TEST_KDF_ITERATIONS: u32 = 1_000;

pub fn test_crypto() -> CryptoBox {
    CryptoBox::new(TEST_KDF_ITERATIONS)
}

pub fn password() -> SecretString {
    SecretString::new("correct horse battery staple")
}

/// Fixed reference instant used by expiration tests
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Configuration pointing at a temporary cache directory
pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.cache.cache_dir = dir.path().to_path_buf();
    config.cache.kdf_iterations = TEST_KDF_ITERATIONS;
    config.indexing.batch_size = 3;
    config.indexing.vault_timeout_seconds = 5;
    config
}

/// A vault holding one of each resource kind, with a value for the secret
pub fn sample_vault(name: &str) -> InventoryVault {
    let expiry = Utc::now() + Duration::days(10);
    InventoryVault::new(name)
        .with_secret(
            SecretMeta::named(format!("{}-db-conn", name)).with_tag("env", "prod"),
            Some("Server=db;Password=hunter2"),
        )
        .with_key(KeyMeta::named(format!("{}-signing", name)))
        .with_certificate(
            CertMeta::named(format!("{}-tls", name)).with_expiry(expiry),
            Some("-----BEGIN CERTIFICATE-----"),
        )
}

/// One subscription containing a sample vault per name
pub fn inventory(vaults: &[&str]) -> Inventory {
    let subscription = vaults
        .iter()
        .fold(InventorySubscription::new("sub-1"), |sub, name| sub.with_vault(sample_vault(name)));
    Inventory { subscriptions: vec![subscription] }
}

pub fn source(vaults: &[&str]) -> Arc<InventoryDataSource> {
    Arc::new(InventoryDataSource::new(inventory(vaults)))
}

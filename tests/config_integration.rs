//! Integration tests for configuration management
//!
//! These tests validate that `VAULTDEX_*` environment variables are read and
//! validated, and that invalid values surface as configuration errors.

use std::env;
use std::sync::Mutex;
use vaultdex::config::AppConfig;
use vaultdex::{Result, VaultdexError};

// Use a mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &[
    "VAULTDEX_CACHE_DIR",
    "VAULTDEX_KDF_ITERATIONS",
    "VAULTDEX_BATCH_SIZE",
    "VAULTDEX_VAULT_TIMEOUT_SECONDS",
    "VAULTDEX_REINDEX_INTERVAL_SECONDS",
    "VAULTDEX_INCLUDE_VALUES",
    "VAULTDEX_LIST_PAGE_SIZE",
    "VAULTDEX_LOG_LEVEL",
    "VAULTDEX_LOG_JSON",
    "VAULTDEX_ENABLE_METRICS",
    "VAULTDEX_METRICS_ADDR",
];

/// Run `f` with the given variables set, restoring the environment afterwards
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = KEYS.iter().map(|k| (*k, env::var(k).ok())).collect();

    for key in KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let result = f();

    for (key, value) in saved {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
    result
}

#[test]
fn test_config_environment_integration() -> Result<()> {
    let config = with_env(
        &[
            ("VAULTDEX_CACHE_DIR", "/tmp/vaultdex-test"),
            ("VAULTDEX_KDF_ITERATIONS", "5000"),
            ("VAULTDEX_BATCH_SIZE", "8"),
            ("VAULTDEX_VAULT_TIMEOUT_SECONDS", "30"),
            ("VAULTDEX_REINDEX_INTERVAL_SECONDS", "0"),
            ("VAULTDEX_INCLUDE_VALUES", "true"),
            ("VAULTDEX_LOG_LEVEL", "vaultdex=debug"),
            ("VAULTDEX_LOG_JSON", "1"),
        ],
        AppConfig::from_env,
    )?;

    assert_eq!(config.cache.cache_dir, std::path::PathBuf::from("/tmp/vaultdex-test"));
    assert_eq!(config.cache.kdf_iterations, 5000);
    assert_eq!(config.indexing.batch_size, 8);
    assert_eq!(config.indexing.vault_timeout().as_secs(), 30);
    assert!(config.indexing.reindex_interval().is_none());
    assert!(config.indexing.include_values);
    assert_eq!(config.observability.log_level, "vaultdex=debug");
    assert!(config.observability.json_logging);
    assert!(!config.observability.enable_metrics);
    Ok(())
}

#[test]
fn test_config_defaults_integration() -> Result<()> {
    let config = with_env(&[], AppConfig::from_env)?;

    assert_eq!(config.cache.kdf_iterations, 100_000);
    assert!(config.cache.cache_dir.ends_with(".vaultdex"));
    assert_eq!(config.indexing.batch_size, 5);
    assert_eq!(config.indexing.vault_timeout_seconds, 120);
    assert_eq!(config.indexing.reindex_interval_seconds, 3600);
    assert!(!config.indexing.include_values);
    assert_eq!(config.observability.log_level, "info");
    assert_eq!(config.observability.metrics_addr, "127.0.0.1:9464");
    Ok(())
}

#[test]
fn test_invalid_values_are_config_errors() {
    let unparsable = with_env(&[("VAULTDEX_BATCH_SIZE", "five")], AppConfig::from_env);
    assert!(matches!(unparsable, Err(VaultdexError::Config(_))));

    let out_of_range = with_env(&[("VAULTDEX_BATCH_SIZE", "0")], AppConfig::from_env);
    assert!(out_of_range.is_err());

    let weak_kdf = with_env(&[("VAULTDEX_KDF_ITERATIONS", "10")], AppConfig::from_env);
    assert!(weak_kdf.is_err());
}

#[test]
fn test_metrics_environment_integration() -> Result<()> {
    let config = with_env(
        &[("VAULTDEX_ENABLE_METRICS", "true"), ("VAULTDEX_METRICS_ADDR", "0.0.0.0:9100")],
        AppConfig::from_env,
    )?;

    assert!(config.observability.enable_metrics);
    assert_eq!(config.observability.metrics_socket_addr()?.port(), 9100);
    Ok(())
}

//! # Configuration Settings
//!
//! Defines the configuration structure for vaultdex.

use crate::crypto::DEFAULT_PBKDF2_ITERATIONS;
use crate::errors::{Result, VaultdexError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Persistent cache configuration
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Indexing coordinator configuration
    #[validate(nested)]
    pub indexing: IndexingConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Build the configuration from `VAULTDEX_*` environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            cache: CacheConfig::from_env()?,
            indexing: IndexingConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(VaultdexError::from)?;
        Ok(())
    }
}

/// Persistent cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Directory holding `cache.salt`, `cache.iv` and `cache.dat`
    pub cache_dir: PathBuf,

    /// PBKDF2 iteration count
    #[validate(range(min = 1000, message = "KDF iterations must be at least 1000"))]
    pub kdf_iterations: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { cache_dir: default_cache_dir(), kdf_iterations: DEFAULT_PBKDF2_ITERATIONS }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self> {
        let cache_dir =
            std::env::var("VAULTDEX_CACHE_DIR").map(PathBuf::from).unwrap_or_else(|_| default_cache_dir());
        let kdf_iterations = env_parse("VAULTDEX_KDF_ITERATIONS", DEFAULT_PBKDF2_ITERATIONS)?;

        Ok(Self { cache_dir, kdf_iterations })
    }
}

fn default_cache_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".vaultdex"),
        None => PathBuf::from(".vaultdex"),
    }
}

/// Indexing coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IndexingConfig {
    /// Vaults crawled concurrently per batch
    #[validate(range(min = 1, max = 64, message = "Batch size must be between 1 and 64"))]
    pub batch_size: usize,

    /// Upper bound on one vault crawl
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Vault timeout must be between 1 and 3600 seconds"
    ))]
    pub vault_timeout_seconds: u64,

    /// Interval between scheduled passes (0 = no scheduler)
    pub reindex_interval_seconds: u64,

    /// Fetch secret and certificate values into the session index
    pub include_values: bool,

    /// Items per listing page requested from the data source
    #[validate(range(min = 1, max = 1000, message = "Page size must be between 1 and 1000"))]
    pub list_page_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            vault_timeout_seconds: 120,
            reindex_interval_seconds: 3600,
            include_values: false,
            list_page_size: 25,
        }
    }
}

impl IndexingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            batch_size: env_parse("VAULTDEX_BATCH_SIZE", defaults.batch_size)?,
            vault_timeout_seconds: env_parse(
                "VAULTDEX_VAULT_TIMEOUT_SECONDS",
                defaults.vault_timeout_seconds,
            )?,
            reindex_interval_seconds: env_parse(
                "VAULTDEX_REINDEX_INTERVAL_SECONDS",
                defaults.reindex_interval_seconds,
            )?,
            include_values: env_flag("VAULTDEX_INCLUDE_VALUES", defaults.include_values),
            list_page_size: env_parse("VAULTDEX_LIST_PAGE_SIZE", defaults.list_page_size)?,
        })
    }

    pub fn vault_timeout(&self) -> Duration {
        Duration::from_secs(self.vault_timeout_seconds)
    }

    /// Scheduler interval, or `None` when scheduling is disabled
    pub fn reindex_interval(&self) -> Option<Duration> {
        match self.reindex_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level filter (e.g., "info", "vaultdex=debug")
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON log lines
    pub json_logging: bool,

    /// Record metrics and serve them in Prometheus format
    pub enable_metrics: bool,

    /// Listen address for the Prometheus scrape endpoint
    #[validate(length(min = 1, message = "Metrics address cannot be empty"))]
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "vaultdex".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: false,
            metrics_addr: "127.0.0.1:9464".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            service_name: defaults.service_name,
            log_level: std::env::var("VAULTDEX_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_flag("VAULTDEX_LOG_JSON", defaults.json_logging),
            enable_metrics: env_flag("VAULTDEX_ENABLE_METRICS", defaults.enable_metrics),
            metrics_addr: std::env::var("VAULTDEX_METRICS_ADDR").unwrap_or(defaults.metrics_addr),
        })
    }

    /// Parsed scrape endpoint address
    pub fn metrics_socket_addr(&self) -> Result<SocketAddr> {
        self.metrics_addr.parse().map_err(|e| {
            VaultdexError::config(format!("Invalid metrics address '{}': {}", self.metrics_addr, e))
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| VaultdexError::config(format!("Invalid {} '{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|s| s.eq_ignore_ascii_case("true") || s == "1").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.indexing.batch_size, 5);
        assert_eq!(config.indexing.vault_timeout(), Duration::from_secs(120));
        assert_eq!(config.cache.kdf_iterations, 100_000);
    }

    #[test]
    fn test_reindex_interval() {
        let mut indexing = IndexingConfig::default();
        assert_eq!(indexing.reindex_interval(), Some(Duration::from_secs(3600)));
        indexing.reindex_interval_seconds = 0;
        assert_eq!(indexing.reindex_interval(), None);
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = AppConfig::default();
        config.indexing.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.indexing.batch_size = 65;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.kdf_iterations = 10;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.log_level = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, VaultdexError::Validation(_)));
    }

    #[test]
    fn test_metrics_socket_addr() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(config.metrics_socket_addr().unwrap().port(), 9464);

        config.metrics_addr = "not-an-address".to_string();
        assert!(matches!(config.metrics_socket_addr(), Err(VaultdexError::Config(_))));
    }
}

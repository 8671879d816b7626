//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//!
//! Secret values, certificate contents and passwords are never recorded as
//! span or event fields. Vault identifiers, resource names and counts are.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{Result, VaultdexError};

/// Create a tracing span for one indexing pass or one vault crawl.
///
/// ```rust,ignore
/// let span = indexing_span!("pass", pass_id = %pass_id);
/// let span = indexing_span!("crawl_vault", vault = %vault);
/// ```
#[macro_export]
macro_rules! indexing_span {
    ($operation:expr) => {
        tracing::info_span!(
            "indexing",
            operation = %$operation,
            vault = tracing::field::Empty
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "indexing",
            operation = %$operation,
            $($field)*
        )
    };
}

/// Create a tracing span for cache operations.
///
/// ```rust,ignore
/// let span = cache_span!("save", layer = "persistent");
/// ```
#[macro_export]
macro_rules! cache_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "cache_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "cache_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. A subscriber that
/// is already installed (e.g. by a test harness) is left in place.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives),
        Err(_) => EnvFilter::try_new(&config.log_level),
    }
    .map_err(|e| VaultdexError::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);
    let installed = if config.json_logging {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = installed {
        tracing::debug!(error = %e, "Tracing subscriber already installed; keeping it");
    }
    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        cache_dir = %config.cache.cache_dir.display(),
        kdf_iterations = config.cache.kdf_iterations,
        batch_size = config.indexing.batch_size,
        vault_timeout_seconds = config.indexing.vault_timeout_seconds,
        reindex_interval_seconds = config.indexing.reindex_interval_seconds,
        include_values = config.indexing.include_values,
        metrics_enabled = config.observability.enable_metrics,
        "vaultdex configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = indexing_span!("pass");
        let _span = indexing_span!("crawl_vault", vault = "kv-prod");
        let _span = cache_span!("save");
        let _span = cache_span!("load", layer = "persistent");
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();
        log_config_info(&config);
    }

    #[test]
    fn test_init_logging_rejects_bad_filter() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config =
            ObservabilityConfig { log_level: "vaultdex=notalevel".to_string(), ..Default::default() };
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_init_logging_twice_keeps_first_subscriber() {
        let config = ObservabilityConfig::default();
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }
}

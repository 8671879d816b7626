//! # Configuration Management
//!
//! Configuration is read from `VAULTDEX_*` environment variables. The binary
//! loads an optional `.env` file with `dotenvy` before calling
//! [`AppConfig::from_env`].

pub mod settings;

pub use settings::{AppConfig, CacheConfig, IndexingConfig, ObservabilityConfig};

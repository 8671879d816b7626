//! # vaultdex
//!
//! Encrypted cross-vault metadata cache and search index for secrets, keys
//! and certificates.
//!
//! ## Architecture
//!
//! ```text
//! VaultDataSource → IndexingCoordinator → PersistentVaultCache  (password-encrypted, on disk)
//!                                       → EphemeralSessionIndex (session-keyed, in memory)
//!                                                   ↓
//!                                       SearchEngine / ExpirationClassifier
//! ```
//!
//! The persistent cache only ever holds metadata. Secret and certificate
//! values may be fetched into the session index, which is keyed by random
//! material that never leaves the process.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultdex::{AppConfig, InventoryDataSource, MetricsRecorder, Result, SecretString, VaultIndexService};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let source = Arc::new(InventoryDataSource::from_file("inventory.json".as_ref()).await?);
//!     let password = SecretString::new("correct horse battery staple");
//!
//!     let service = VaultIndexService::new(&config, source, Some(password.clone()), MetricsRecorder::default())?;
//!     service.load(&password).await;
//!     service.run_indexing().await?;
//!     for hit in service.global_search("db-conn").await {
//!         println!("{} {} {}", hit.vault_identifier, hit.name, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod expiration;
pub mod indexing;
pub mod observability;
pub mod search;
pub mod services;
pub mod source;

// Re-export commonly used types and traits
pub use cache::{EphemeralSessionIndex, LoadOutcome, PersistentVaultCache};
pub use config::AppConfig;
pub use crypto::CryptoBox;
pub use domain::{SearchHit, SecretString, SessionVaultRecord, VaultRecord};
pub use errors::{Result, VaultdexError};
pub use expiration::ExpirationStatus;
pub use indexing::{IndexingCoordinator, IndexingJob, JobStatus, PassReport};
pub use observability::MetricsRecorder;
pub use services::VaultIndexService;
pub use source::{InventoryDataSource, VaultDataSource};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

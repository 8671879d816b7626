//! Vault data source abstraction
//!
//! The indexing coordinator reaches the vault provider only through
//! [`VaultDataSource`]. Resource listings are lazy streams so a provider can
//! page through large vaults without buffering them.

pub mod inventory;

pub use inventory::{Inventory, InventoryDataSource, InventorySubscription, InventoryVault};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::domain::{CertMeta, KeyMeta, SecretMeta, SecretString, Subscription, VaultInfo};
use crate::errors::Result;

/// Lazily paged listing of one resource kind
pub type ResourceStream<T> = BoxStream<'static, Result<T>>;

/// Trait for reading subscriptions, vaults and vault contents from a provider
///
/// Implementations must never log secret or certificate values.
#[async_trait]
pub trait VaultDataSource: Send + Sync {
    /// Subscriptions visible to the current identity
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Vaults inside one subscription
    async fn list_vaults(&self, subscription_id: &str) -> Result<Vec<VaultInfo>>;

    fn list_secrets(&self, vault: &VaultInfo) -> ResourceStream<SecretMeta>;

    fn list_keys(&self, vault: &VaultInfo) -> ResourceStream<KeyMeta>;

    fn list_certificates(&self, vault: &VaultInfo) -> ResourceStream<CertMeta>;

    /// Current value of a secret (session index only)
    async fn get_secret_value(&self, vault: &VaultInfo, name: &str) -> Result<SecretString>;

    /// Certificate contents (session index only)
    async fn get_certificate_value(&self, vault: &VaultInfo, name: &str) -> Result<SecretString>;
}

/// Drain a listing into memory, stopping at the first error
pub async fn collect_all<T: Send + 'static>(stream: ResourceStream<T>) -> Result<Vec<T>> {
    stream.try_collect().await
}

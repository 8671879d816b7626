//! File and in-memory inventory backend
//!
//! Serves a static inventory of subscriptions and vaults through
//! [`VaultDataSource`]. The CLI reads one from a JSON file; tests build one in
//! memory and inject failures and latency per vault.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{ResourceStream, VaultDataSource};
use crate::domain::{CertMeta, KeyMeta, SecretMeta, SecretString, Subscription, VaultInfo};
use crate::errors::{Result, VaultdexError};

/// Default number of items per listing page
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Root of an inventory document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub subscriptions: Vec<InventorySubscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySubscription {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vaults: Vec<InventoryVault>,
}

impl InventorySubscription {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self { name: id.clone(), id, vaults: Vec::new() }
    }

    pub fn with_vault(mut self, vault: InventoryVault) -> Self {
        self.vaults.push(vault);
        self
    }
}

/// One vault with its contents. Values are optional and only served to the
/// session index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryVault {
    #[serde(flatten)]
    pub info: VaultInfo,
    #[serde(default)]
    pub secrets: Vec<InventoryItem<SecretMeta>>,
    #[serde(default)]
    pub keys: Vec<KeyMeta>,
    #[serde(default)]
    pub certificates: Vec<InventoryItem<CertMeta>>,
}

/// Metadata plus an optional value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem<M> {
    #[serde(flatten)]
    pub meta: M,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl InventoryVault {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: VaultInfo::named(name),
            secrets: Vec::new(),
            keys: Vec::new(),
            certificates: Vec::new(),
        }
    }

    pub fn with_secret(mut self, meta: SecretMeta, value: Option<&str>) -> Self {
        self.secrets.push(InventoryItem { meta, value: value.map(str::to_string) });
        self
    }

    pub fn with_key(mut self, meta: KeyMeta) -> Self {
        self.keys.push(meta);
        self
    }

    pub fn with_certificate(mut self, meta: CertMeta, value: Option<&str>) -> Self {
        self.certificates.push(InventoryItem { meta, value: value.map(str::to_string) });
        self
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    subscriptions: Vec<Subscription>,
    vaults_by_subscription: HashMap<String, Vec<VaultInfo>>,
    vaults: HashMap<String, InventoryVault>,
    failing_listing: Option<String>,
    failing_subscriptions: HashMap<String, String>,
    failing_vaults: HashMap<String, String>,
    latency: HashMap<String, Duration>,
}

impl InventoryState {
    fn from_inventory(inventory: Inventory) -> Self {
        let mut state = Self::default();
        for sub in inventory.subscriptions {
            let infos = sub.vaults.iter().map(|v| v.info.clone()).collect();
            state.vaults_by_subscription.insert(sub.id.clone(), infos);
            for vault in sub.vaults {
                state.vaults.insert(vault.info.identifier().to_string(), vault);
            }
            state.subscriptions.push(Subscription { id: sub.id, name: sub.name });
        }
        state
    }

    /// Look up a vault, applying injected failures
    fn vault(&self, identifier: &str) -> Result<&InventoryVault> {
        if let Some(reason) = self.failing_vaults.get(identifier) {
            return Err(VaultdexError::data_source(reason.clone()));
        }
        self.vaults
            .get(identifier)
            .ok_or_else(|| VaultdexError::data_source(format!("Vault '{}' not found", identifier)))
    }
}

/// [`VaultDataSource`] over an [`Inventory`]
#[derive(Clone)]
pub struct InventoryDataSource {
    state: Arc<RwLock<InventoryState>>,
    page_size: usize,
    crawl_count: Arc<AtomicUsize>,
}

impl std::fmt::Debug for InventoryDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryDataSource").field("page_size", &self.page_size).finish()
    }
}

impl InventoryDataSource {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            state: Arc::new(RwLock::new(InventoryState::from_inventory(inventory))),
            page_size: DEFAULT_PAGE_SIZE,
            crawl_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load an inventory document from a JSON file
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            VaultdexError::data_source(format!(
                "Failed to read inventory {}: {}",
                path.display(),
                e
            ))
        })?;
        let inventory: Inventory = serde_json::from_slice(&bytes)
            .map_err(|e| VaultdexError::serialization("Failed to parse inventory", e))?;

        debug!(subscriptions = inventory.subscriptions.len(), "Loaded inventory");
        Ok(Self::new(inventory))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Swap the whole inventory, keeping injected failures and latency
    pub async fn replace_inventory(&self, inventory: Inventory) {
        let mut state = self.state.write().await;
        let fresh = InventoryState::from_inventory(inventory);
        state.subscriptions = fresh.subscriptions;
        state.vaults_by_subscription = fresh.vaults_by_subscription;
        state.vaults = fresh.vaults;
    }

    /// Make subscription listing fail
    pub async fn fail_subscription_listing(&self, reason: impl Into<String>) {
        self.state.write().await.failing_listing = Some(reason.into());
    }

    /// Make vault enumeration of one subscription fail
    pub async fn fail_subscription(&self, subscription_id: &str, reason: impl Into<String>) {
        let mut state = self.state.write().await;
        state.failing_subscriptions.insert(subscription_id.to_string(), reason.into());
    }

    /// Make every listing and value lookup of one vault fail
    pub async fn fail_vault(&self, identifier: &str, reason: impl Into<String>) {
        self.state.write().await.failing_vaults.insert(identifier.to_string(), reason.into());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.failing_listing = None;
        state.failing_subscriptions.clear();
        state.failing_vaults.clear();
    }

    /// Delay the start of every listing of one vault
    pub async fn set_latency(&self, identifier: &str, latency: Duration) {
        self.state.write().await.latency.insert(identifier.to_string(), latency);
    }

    /// Number of secret listings started so far; one per vault crawl
    pub fn crawl_count(&self) -> usize {
        self.crawl_count.load(Ordering::SeqCst)
    }

    fn page_stream<T, F>(&self, vault: &VaultInfo, select: F) -> ResourceStream<T>
    where
        T: Send + 'static,
        F: Fn(&InventoryVault) -> Vec<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let identifier = vault.identifier().to_string();
        let page_size = self.page_size;

        let stream = async_stream::stream! {
            let lookup = {
                let state = state.read().await;
                state
                    .vault(&identifier)
                    .map(|v| (select(v), state.latency.get(&identifier).copied()))
            };
            let (items, latency) = match lookup {
                Ok(found) => found,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            let mut items = items.into_iter();
            let mut page_number = 0usize;
            loop {
                let page: Vec<T> = items.by_ref().take(page_size).collect();
                if page.is_empty() {
                    break;
                }
                page_number += 1;
                debug!(vault = %identifier, page = page_number, items = page.len(), "Serving page");
                for item in page {
                    yield Ok(item);
                }
                tokio::task::yield_now().await;
            }
        };

        Box::pin(stream)
    }

    async fn value_of(
        &self,
        vault: &VaultInfo,
        name: &str,
        select: impl Fn(&InventoryVault) -> Option<Option<String>>,
    ) -> Result<SecretString> {
        let state = self.state.read().await;
        let found = state.vault(vault.identifier())?;
        match select(found) {
            Some(Some(value)) => Ok(SecretString::new(value)),
            Some(None) => Err(VaultdexError::data_source(format!("'{}' has no value", name))),
            None => Err(VaultdexError::data_source(format!(
                "'{}' not found in vault '{}'",
                name,
                vault.identifier()
            ))),
        }
    }
}

#[async_trait]
impl VaultDataSource for InventoryDataSource {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let state = self.state.read().await;
        if let Some(reason) = &state.failing_listing {
            return Err(VaultdexError::data_source(reason.clone()));
        }
        Ok(state.subscriptions.clone())
    }

    async fn list_vaults(&self, subscription_id: &str) -> Result<Vec<VaultInfo>> {
        let state = self.state.read().await;
        if let Some(reason) = state.failing_subscriptions.get(subscription_id) {
            return Err(VaultdexError::subscription(subscription_id, reason.clone()));
        }
        state.vaults_by_subscription.get(subscription_id).cloned().ok_or_else(|| {
            VaultdexError::subscription(subscription_id, "Subscription not found")
        })
    }

    fn list_secrets(&self, vault: &VaultInfo) -> ResourceStream<SecretMeta> {
        self.crawl_count.fetch_add(1, Ordering::SeqCst);
        self.page_stream(vault, |v| v.secrets.iter().map(|s| s.meta.clone()).collect())
    }

    fn list_keys(&self, vault: &VaultInfo) -> ResourceStream<KeyMeta> {
        self.page_stream(vault, |v| v.keys.clone())
    }

    fn list_certificates(&self, vault: &VaultInfo) -> ResourceStream<CertMeta> {
        self.page_stream(vault, |v| v.certificates.iter().map(|c| c.meta.clone()).collect())
    }

    async fn get_secret_value(&self, vault: &VaultInfo, name: &str) -> Result<SecretString> {
        self.value_of(vault, name, |v| {
            v.secrets.iter().find(|s| s.meta.name == name).map(|s| s.value.clone())
        })
        .await
    }

    async fn get_certificate_value(&self, vault: &VaultInfo, name: &str) -> Result<SecretString> {
        self.value_of(vault, name, |v| {
            v.certificates.iter().find(|c| c.meta.name == name).map(|c| c.value.clone())
        })
        .await
    }
}

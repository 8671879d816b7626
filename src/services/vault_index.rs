//! Query surface over both cache layers and the indexing coordinator

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::cache::{
    CacheStats, EphemeralSessionIndex, LoadOutcome, PersistentVaultCache, SessionSearchOptions,
};
use crate::config::AppConfig;
use crate::crypto::CryptoBox;
use crate::domain::{SearchHit, SecretString};
use crate::errors::Result;
use crate::indexing::{
    CoordinatorSettings, IndexingCoordinator, IndexingJob, PassHandle, PassReport,
};
use crate::observability::MetricsRecorder;
use crate::search;
use crate::source::VaultDataSource;

/// Service wiring the persistent cache, the session index and the coordinator
#[derive(Debug, Clone)]
pub struct VaultIndexService {
    persistent: Arc<PersistentVaultCache>,
    session: Arc<EphemeralSessionIndex>,
    coordinator: IndexingCoordinator,
    metrics: MetricsRecorder,
}

impl VaultIndexService {
    /// Build every component from configuration.
    ///
    /// When `cache_password` is given the coordinator saves the persistent
    /// cache after each completed pass.
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn VaultDataSource>,
        cache_password: Option<SecretString>,
        metrics: MetricsRecorder,
    ) -> Result<Self> {
        let persistent = Arc::new(PersistentVaultCache::new(
            config.cache.cache_dir.clone(),
            CryptoBox::new(config.cache.kdf_iterations),
        ));
        let session = Arc::new(EphemeralSessionIndex::new()?);

        let mut builder = IndexingCoordinator::builder(source)
            .persistent(persistent.clone())
            .session(session.clone())
            .settings(CoordinatorSettings::from(&config.indexing))
            .metrics(metrics);
        if let Some(password) = cache_password {
            builder = builder.cache_password(password);
        }

        Ok(Self::from_parts(persistent, session, builder.build(), metrics))
    }

    pub fn from_parts(
        persistent: Arc<PersistentVaultCache>,
        session: Arc<EphemeralSessionIndex>,
        coordinator: IndexingCoordinator,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { persistent, session, coordinator, metrics }
    }

    pub fn persistent(&self) -> &Arc<PersistentVaultCache> {
        &self.persistent
    }

    pub fn session(&self) -> &Arc<EphemeralSessionIndex> {
        &self.session
    }

    pub fn coordinator(&self) -> &IndexingCoordinator {
        &self.coordinator
    }

    /// Load the persistent cache; never fails
    pub async fn load(&self, password: &SecretString) -> LoadOutcome {
        let outcome = self.persistent.load(password).await;
        info!(outcome = ?outcome, "Persistent cache loaded");
        outcome
    }

    pub async fn save(&self, password: &SecretString) -> Result<usize> {
        let result = self.persistent.save(password).await;
        self.metrics.record_cache_save(result.is_ok());
        result
    }

    /// Ranked search over the names of every cached vault
    #[instrument(skip(self, term))]
    pub async fn global_search(&self, term: &str) -> Vec<SearchHit> {
        let mut hits = self.persistent.global_search(term).await;
        search::rank(&mut hits);
        self.metrics.record_search("persistent", hits.len());
        debug!(hits = hits.len(), "Global search finished");
        hits
    }

    /// Ranked search over the session index, optionally including values
    #[instrument(skip(self, term))]
    pub async fn search_session(&self, term: &str, include_values: bool) -> Result<Vec<SearchHit>> {
        let hits = self.session.search(term, SessionSearchOptions { include_values }).await?;
        self.metrics.record_search("session", hits.len());
        Ok(hits)
    }

    /// Enabled certificates expiring within `days`, soonest first
    pub async fn expiring_certificates(&self, days: i64) -> Vec<SearchHit> {
        self.persistent.expiring_certificates(days).await
    }

    /// Enabled secrets expiring within `days`, soonest first
    pub async fn expiring_secrets(&self, days: i64) -> Vec<SearchHit> {
        self.persistent.expiring_secrets(days).await
    }

    pub async fn start_indexing(&self) -> Result<PassHandle> {
        self.coordinator.start_indexing().await
    }

    /// Run a pass on the calling task and return its report
    pub async fn run_indexing(&self) -> Result<PassReport> {
        self.coordinator.run_pass().await
    }

    pub async fn cancel_indexing(&self) -> bool {
        self.coordinator.cancel_indexing().await
    }

    pub async fn indexing_status(&self) -> IndexingJob {
        self.coordinator.indexing_status().await
    }

    /// Empty both layers and delete the persistent cache files
    pub async fn clear_cache(&self) -> Result<()> {
        self.persistent.clear().await?;
        self.session.clear().await;
        info!("Cleared all cache layers");
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        self.persistent.stats().await
    }
}

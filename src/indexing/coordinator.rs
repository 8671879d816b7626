//! Batched concurrent crawl across subscriptions, vaults and resources

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::job::{IndexFailure, IndexingJob, JobStatus, PassOutcome, PassReport};
use crate::cache::{EphemeralSessionIndex, PersistentVaultCache};
use crate::config::IndexingConfig;
use crate::domain::{SecretString, SessionVaultRecord, VaultInfo, VaultRecord};
use crate::errors::{Result, VaultdexError};
use crate::observability::MetricsRecorder;
use crate::source::{collect_all, VaultDataSource};

/// Tunables of the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub batch_size: usize,
    pub vault_timeout: Duration,
    /// Fetch secret and certificate values for the session index
    pub include_values: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&IndexingConfig::default())
    }
}

impl From<&IndexingConfig> for CoordinatorSettings {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            vault_timeout: config.vault_timeout(),
            include_values: config.include_values,
        }
    }
}

#[derive(Debug, Default)]
struct JobSlot {
    job: IndexingJob,
    cancel: Option<CancellationToken>,
}

struct CoordinatorInner {
    source: Arc<dyn VaultDataSource>,
    persistent: Option<Arc<PersistentVaultCache>>,
    session: Option<Arc<EphemeralSessionIndex>>,
    cache_password: Option<SecretString>,
    settings: CoordinatorSettings,
    metrics: MetricsRecorder,
    slot: RwLock<JobSlot>,
}

/// Builder for [`IndexingCoordinator`]
pub struct CoordinatorBuilder {
    source: Arc<dyn VaultDataSource>,
    persistent: Option<Arc<PersistentVaultCache>>,
    session: Option<Arc<EphemeralSessionIndex>>,
    cache_password: Option<SecretString>,
    settings: CoordinatorSettings,
    metrics: MetricsRecorder,
}

impl CoordinatorBuilder {
    /// Write crawled metadata into the persistent cache
    pub fn persistent(mut self, cache: Arc<PersistentVaultCache>) -> Self {
        self.persistent = Some(cache);
        self
    }

    /// Write crawled records into the session index
    pub fn session(mut self, index: Arc<EphemeralSessionIndex>) -> Self {
        self.session = Some(index);
        self
    }

    /// Save the persistent cache with this password after every completed pass
    pub fn cache_password(mut self, password: SecretString) -> Self {
        self.cache_password = Some(password);
        self
    }

    pub fn settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> IndexingCoordinator {
        IndexingCoordinator {
            inner: Arc::new(CoordinatorInner {
                source: self.source,
                persistent: self.persistent,
                session: self.session,
                cache_password: self.cache_password,
                settings: self.settings,
                metrics: self.metrics,
                slot: RwLock::new(JobSlot::default()),
            }),
        }
    }
}

/// Handle to a pass running in the background
pub struct PassHandle {
    pub pass_id: Uuid,
    join: JoinHandle<PassReport>,
}

impl PassHandle {
    /// Wait for the pass to finish
    pub async fn wait(self) -> Result<PassReport> {
        self.join
            .await
            .map_err(|e| VaultdexError::internal(format!("Indexing task failed: {}", e)))
    }
}

/// Owns the indexing job and runs passes.
///
/// Cheap to clone; clones share the job state.
#[derive(Clone)]
pub struct IndexingCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for IndexingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingCoordinator")
            .field("settings", &self.inner.settings)
            .field("persistent", &self.inner.persistent.is_some())
            .field("session", &self.inner.session.is_some())
            .finish()
    }
}

impl IndexingCoordinator {
    pub fn builder(source: Arc<dyn VaultDataSource>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            source,
            persistent: None,
            session: None,
            cache_password: None,
            settings: CoordinatorSettings::default(),
            metrics: MetricsRecorder::default(),
        }
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.inner.settings
    }

    /// Snapshot of the job state
    pub async fn indexing_status(&self) -> IndexingJob {
        self.inner.slot.read().await.job.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.slot.read().await.job.status == JobStatus::Running
    }

    /// Start a pass in the background.
    ///
    /// Fails with `AlreadyRunning` while another pass is in flight; the running
    /// pass's progress is left untouched.
    pub async fn start_indexing(&self) -> Result<PassHandle> {
        let (pass_id, token) = self.begin_pass().await?;
        let coordinator = self.clone();
        let join = tokio::spawn(async move { coordinator.execute(pass_id, token).await });
        Ok(PassHandle { pass_id, join })
    }

    /// Run a pass to completion on the current task
    pub async fn run_pass(&self) -> Result<PassReport> {
        let (pass_id, token) = self.begin_pass().await?;
        Ok(self.execute(pass_id, token).await)
    }

    /// Ask the running pass to stop after its current batch.
    ///
    /// Returns `false` when nothing is running.
    pub async fn cancel_indexing(&self) -> bool {
        let slot = self.inner.slot.read().await;
        match (&slot.job.status, &slot.cancel) {
            (JobStatus::Running, Some(token)) => {
                info!(pass_id = ?slot.job.current_pass, "Cancelling indexing pass");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    async fn begin_pass(&self) -> Result<(Uuid, CancellationToken)> {
        let mut slot = self.inner.slot.write().await;
        if !slot.job.status.can_start() {
            return Err(VaultdexError::AlreadyRunning {
                progress_percent: slot.job.progress_percent,
            });
        }

        let pass_id = Uuid::new_v4();
        let token = CancellationToken::new();
        slot.job.status = JobStatus::Running;
        slot.job.progress_percent = 0;
        slot.job.current_pass = Some(pass_id);
        slot.job.started_at = Some(Utc::now());
        slot.job.finished_at = None;
        slot.cancel = Some(token.clone());

        self.inner.metrics.set_progress(0);
        Ok((pass_id, token))
    }

    async fn execute(&self, pass_id: Uuid, token: CancellationToken) -> PassReport {
        let span = crate::indexing_span!("pass", pass_id = %pass_id);
        async move {
            let started = Instant::now();
            let mut report = PassReport::new(pass_id, Utc::now());
            info!(batch_size = self.inner.settings.batch_size, "Indexing pass started");

            report.outcome = self.crawl(&mut report, &token).await;

            if report.outcome == PassOutcome::Completed {
                report.persistence_warning = self.save_after_pass().await;
            }

            report.finished_at = Utc::now();
            report.duration_ms = started.elapsed().as_millis() as u64;
            self.finish_pass(&report).await;

            info!(
                outcome = report.outcome.as_str(),
                vaults_total = report.vaults_total,
                vaults_indexed = report.vaults_indexed.len(),
                failures = report.failures.len(),
                duration_ms = report.duration_ms,
                "Indexing pass finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn crawl(&self, report: &mut PassReport, token: &CancellationToken) -> PassOutcome {
        let source = &self.inner.source;

        let subscriptions = match source.list_subscriptions().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                warn!(error = %e, "Failed to list subscriptions");
                self.record_failure(report, IndexFailure::SubscriptionListing { reason: e.to_string() });
                return PassOutcome::Failed;
            }
        };
        report.subscriptions_total = subscriptions.len();

        let mut vaults: Vec<VaultInfo> = Vec::new();
        let mut seen = HashSet::new();
        let mut failed_subscriptions = 0usize;
        for subscription in &subscriptions {
            match source.list_vaults(&subscription.id).await {
                Ok(found) => {
                    debug!(subscription = %subscription.id, vaults = found.len(), "Enumerated vaults");
                    vaults.extend(found.into_iter().filter(|v| seen.insert(v.identifier().to_string())));
                }
                Err(e) => {
                    warn!(subscription = %subscription.id, error = %e, "Skipping subscription");
                    failed_subscriptions += 1;
                    self.record_failure(report, IndexFailure::subscription(&subscription.id, &e));
                }
            }
        }

        if !subscriptions.is_empty() && failed_subscriptions == subscriptions.len() {
            warn!(subscriptions = subscriptions.len(), "Every subscription failed enumeration");
            return PassOutcome::Failed;
        }

        report.vaults_total = vaults.len();
        if vaults.is_empty() {
            self.set_progress(100).await;
            return PassOutcome::Completed;
        }

        let batch_size = self.inner.settings.batch_size.max(1);
        for (batch_number, batch) in vaults.chunks(batch_size).enumerate() {
            if token.is_cancelled() {
                info!(processed = report.vaults_processed, "Indexing pass cancelled between batches");
                return PassOutcome::Cancelled;
            }

            debug!(batch = batch_number + 1, vaults = batch.len(), "Crawling batch");
            let results = join_all(batch.iter().map(|vault| self.crawl_vault(vault))).await;

            let mut indexed_at = Vec::with_capacity(batch.len());
            for (vault, result) in batch.iter().zip(results) {
                let identifier = vault.identifier();
                let stored = match result {
                    Ok(record) => self.store(identifier, record).await,
                    Err(e) => Err(e),
                };
                match stored {
                    Ok(last_indexed) => {
                        report.vaults_indexed.push(identifier.to_string());
                        indexed_at.push((identifier.to_string(), last_indexed));
                    }
                    Err(e) => {
                        warn!(vault = %identifier, kind = e.kind(), error = %e, "Vault indexing failed");
                        self.record_failure(report, IndexFailure::vault(identifier, &e));
                    }
                }
            }

            report.vaults_processed += batch.len();
            let percent = (report.vaults_processed * 100 / report.vaults_total) as u8;

            let mut slot = self.inner.slot.write().await;
            slot.job.last_indexed_per_vault.extend(indexed_at);
            slot.job.progress_percent = percent;
            drop(slot);
            self.inner.metrics.set_progress(percent);
        }

        PassOutcome::Completed
    }

    /// Fetch one vault's three listings concurrently, bounded by the vault timeout
    #[instrument(skip(self, vault), fields(vault = %vault.identifier()))]
    async fn crawl_vault(&self, vault: &VaultInfo) -> Result<SessionVaultRecord> {
        let source = &self.inner.source;
        let identifier = vault.identifier().to_string();
        let timeout = self.inner.settings.vault_timeout;

        let crawl = async {
            let (secrets, keys, certificates) = futures::try_join!(
                collect_all(source.list_secrets(vault)),
                collect_all(source.list_keys(vault)),
                collect_all(source.list_certificates(vault)),
            )?;

            let mut record = SessionVaultRecord::new(
                VaultRecord::new(identifier.clone())
                    .with_secrets(secrets)
                    .with_keys(keys)
                    .with_certificates(certificates),
            );
            if self.inner.settings.include_values {
                self.fetch_values(vault, &mut record).await;
            }
            Ok::<_, VaultdexError>(record)
        };

        match tokio::time::timeout(timeout, crawl).await {
            Ok(Ok(record)) => {
                debug!(resources = record.record.resource_count(), "Crawled vault");
                Ok(record)
            }
            Ok(Err(e)) => Err(VaultdexError::per_vault(identifier, e.to_string())),
            Err(_) => Err(VaultdexError::timeout(
                format!("indexing vault {}", identifier),
                timeout.as_millis() as u64,
            )),
        }
    }

    /// Fetch values of enabled secrets and certificates; a failed lookup skips that value
    async fn fetch_values(&self, vault: &VaultInfo, record: &mut SessionVaultRecord) {
        let source = &self.inner.source;

        let secret_names: Vec<String> =
            record.record.secrets.iter().filter(|s| s.enabled).map(|s| s.name.clone()).collect();
        for name in secret_names {
            match source.get_secret_value(vault, &name).await {
                Ok(value) => {
                    record.secret_values.insert(name, value);
                }
                Err(e) => debug!(secret = %name, error = %e, "Skipping secret value"),
            }
        }

        let certificate_names: Vec<String> = record
            .record
            .certificates
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.name.clone())
            .collect();
        for name in certificate_names {
            match source.get_certificate_value(vault, &name).await {
                Ok(value) => {
                    record.certificate_values.insert(name, value);
                }
                Err(e) => debug!(certificate = %name, error = %e, "Skipping certificate value"),
            }
        }
    }

    /// Write one crawled vault into the configured layers
    async fn store(
        &self,
        identifier: &str,
        record: SessionVaultRecord,
    ) -> Result<DateTime<Utc>> {
        let last_indexed = record.record.last_indexed;
        let resources = record.record.resource_count();

        if let Some(persistent) = &self.inner.persistent {
            persistent.upsert(identifier, record.record.clone()).await;
        }
        if let Some(session) = &self.inner.session {
            session.set(identifier, record).await?;
            session.rebuild_index(identifier).await?;
        }

        self.inner.metrics.record_vault_indexed(resources);
        Ok(last_indexed)
    }

    async fn save_after_pass(&self) -> Option<String> {
        let (Some(persistent), Some(password)) = (&self.inner.persistent, &self.inner.cache_password)
        else {
            return None;
        };

        match persistent.save(password).await {
            Ok(vaults) => {
                debug!(vaults, "Saved persistent cache after pass");
                self.inner.metrics.record_cache_save(true);
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to save persistent cache after pass");
                self.inner.metrics.record_cache_save(false);
                Some(e.to_string())
            }
        }
    }

    async fn set_progress(&self, percent: u8) {
        self.inner.slot.write().await.job.progress_percent = percent;
        self.inner.metrics.set_progress(percent);
    }

    fn record_failure(&self, report: &mut PassReport, failure: IndexFailure) {
        self.inner.metrics.record_index_failure(failure.kind());
        report.failures.push(failure);
    }

    async fn finish_pass(&self, report: &PassReport) {
        let mut slot = self.inner.slot.write().await;
        slot.job.status = report.outcome.job_status();
        slot.job.current_pass = None;
        slot.job.finished_at = Some(report.finished_at);
        slot.job.last_report = Some(report.clone());
        slot.cancel = None;
        drop(slot);

        self.inner
            .metrics
            .record_pass(report.outcome.as_str(), report.duration_ms as f64 / 1000.0);
    }
}

//! Indexing job state and pass reports

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::VaultdexError;

/// Lifecycle of the indexing job
///
/// `Idle → Running → {Completed, Failed}`, and `Running → Idle` on
/// cancellation. A new pass may start from any state except `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn can_start(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coordinator-owned job state; callers get clones
#[derive(Debug, Clone, Serialize)]
pub struct IndexingJob {
    pub status: JobStatus,
    pub progress_percent: u8,
    pub last_indexed_per_vault: BTreeMap<String, DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_pass: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<PassReport>,
}

impl Default for IndexingJob {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            progress_percent: 0,
            last_indexed_per_vault: BTreeMap::new(),
            current_pass: None,
            started_at: None,
            finished_at: None,
            last_report: None,
        }
    }
}

impl IndexingJob {
    /// Failures recorded by the most recent finished pass
    pub fn recent_failures(&self) -> &[IndexFailure] {
        self.last_report.as_ref().map(|r| r.failures.as_slice()).unwrap_or_default()
    }
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl PassOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Job status the coordinator settles in after this outcome
    pub fn job_status(&self) -> JobStatus {
        match self {
            Self::Completed => JobStatus::Completed,
            Self::Failed => JobStatus::Failed,
            Self::Cancelled => JobStatus::Idle,
        }
    }
}

/// A failure caught during a pass and recorded instead of aborting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum IndexFailure {
    /// Subscriptions could not be listed at all
    SubscriptionListing { reason: String },
    /// Vaults of one subscription could not be listed
    Subscription { subscription_id: String, reason: String },
    /// One vault could not be crawled or stored
    Vault { vault: String, kind: String, reason: String },
}

impl IndexFailure {
    pub fn vault(vault: impl Into<String>, error: &VaultdexError) -> Self {
        Self::Vault { vault: vault.into(), kind: error.kind().to_string(), reason: error.to_string() }
    }

    pub fn subscription(subscription_id: impl Into<String>, error: &VaultdexError) -> Self {
        Self::Subscription { subscription_id: subscription_id.into(), reason: error.to_string() }
    }

    /// Label used for the failure metric
    pub fn kind(&self) -> &str {
        match self {
            Self::SubscriptionListing { .. } => "subscription_listing",
            Self::Subscription { .. } => "subscription",
            Self::Vault { kind, .. } => kind,
        }
    }
}

/// Summary of one indexing pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub outcome: PassOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub subscriptions_total: usize,
    pub vaults_total: usize,
    pub vaults_processed: usize,
    pub vaults_indexed: Vec<String>,
    pub failures: Vec<IndexFailure>,
    /// Set when the pass completed but the persistent cache could not be saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

impl PassReport {
    pub(crate) fn new(pass_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            pass_id,
            outcome: PassOutcome::Completed,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            subscriptions_total: 0,
            vaults_total: 0,
            vaults_processed: 0,
            vaults_indexed: Vec::new(),
            failures: Vec::new(),
            persistence_warning: None,
        }
    }

    pub fn vault_failures(&self) -> impl Iterator<Item = &IndexFailure> {
        self.failures.iter().filter(|f| matches!(f, IndexFailure::Vault { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Idle.can_start());
        assert!(JobStatus::Completed.can_start());
        assert!(JobStatus::Failed.can_start());
        assert!(!JobStatus::Running.can_start());

        assert_eq!(PassOutcome::Cancelled.job_status(), JobStatus::Idle);
        assert_eq!(PassOutcome::Failed.job_status(), JobStatus::Failed);
    }

    #[test]
    fn test_failure_serialization_is_tagged() {
        let err = VaultdexError::timeout("indexing vault kv-b", 120_000);
        let failure = IndexFailure::vault("kv-b", &err);
        assert_eq!(failure.kind(), "timeout");

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["scope"], "vault");
        assert_eq!(json["vault"], "kv-b");
    }

    #[test]
    fn test_recent_failures_default_empty() {
        let job = IndexingJob::default();
        assert!(job.recent_failures().is_empty());
        assert_eq!(job.status, JobStatus::Idle);
    }
}

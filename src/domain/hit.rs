//! Search results
//!
//! Hits are computed on demand from cached records and never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::vault::{ResourceMeta, ResourceType};
use crate::expiration::{self, ExpirationStatus};

/// Which field of the resource produced the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Name,
    /// Tag key or tag value (session index only)
    Tag,
    /// Secret or certificate value (session index only)
    Value,
    /// Resource type listing rather than a term match, e.g. expiration queries
    None,
}

/// One matching resource in one vault
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub vault_identifier: String,
    pub resource_type: ResourceType,
    pub name: String,
    /// Relevance in 0..=100
    pub score: u8,
    pub matched_on: MatchField,
    pub source: ResourceMeta,
}

impl SearchHit {
    pub fn new(
        vault_identifier: impl Into<String>,
        source: ResourceMeta,
        score: u8,
        matched_on: MatchField,
    ) -> Self {
        Self {
            vault_identifier: vault_identifier.into(),
            resource_type: source.resource_type(),
            name: source.name().to_string(),
            score,
            matched_on,
            source,
        }
    }

    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.source.expires_on()
    }

    /// Alert bucket of the underlying resource relative to `now`
    pub fn expiration_status(&self, now: DateTime<Utc>) -> ExpirationStatus {
        expiration::classify(self.expires_on(), now)
    }
}

//! Per-vault search index for the session layer
//!
//! Holds resource names, tags and metadata of one vault, stamped with the
//! generation of the record it was built from. Values are never copied in
//! here; value search goes back to the encrypted record.

use std::collections::BTreeMap;

use super::{score, MatchScore, Query};
use crate::domain::{MatchField, ResourceMeta, ResourceType, SearchHit, VaultRecord};

#[derive(Debug, Clone)]
struct IndexEntry {
    name: String,
    tags: BTreeMap<String, String>,
    meta: ResourceMeta,
}

#[derive(Debug, Clone)]
pub struct VaultSearchIndex {
    vault_identifier: String,
    generation: u64,
    entries: Vec<IndexEntry>,
}

impl VaultSearchIndex {
    /// Build the index for `record` at record generation `generation`
    pub fn build(record: &VaultRecord, generation: u64) -> Self {
        let entries = record
            .resources()
            .map(|r| IndexEntry {
                name: r.name().to_string(),
                tags: r.tags().clone(),
                meta: r.to_meta(),
            })
            .collect();

        Self { vault_identifier: record.vault_identifier.clone(), generation, entries }
    }

    pub fn vault_identifier(&self) -> &str {
        &self.vault_identifier
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the record has changed since this index was built
    pub fn is_stale(&self, current_generation: u64) -> bool {
        self.generation != current_generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of resources of one kind, in record order
    pub fn names(&self, resource_type: ResourceType) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |e| e.meta.resource_type() == resource_type)
            .map(|e| e.name.as_str())
    }

    /// Match names at full weight and tags at half weight.
    ///
    /// Each resource yields at most one hit, from its best-scoring field.
    pub fn search(&self, query: &Query) -> Vec<SearchHit> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let name_match = score(query, &entry.name).map(|m| (m, MatchField::Name));
                let tag_match = best_tag_match(query, &entry.tags).map(|m| (m, MatchField::Tag));

                let (m, field) = match (name_match, tag_match) {
                    (Some(n), Some(t)) if t.0.score > n.0.score => t,
                    (Some(n), _) => n,
                    (None, t) => t?,
                };

                Some(SearchHit::new(
                    self.vault_identifier.clone(),
                    entry.meta.clone(),
                    m.score,
                    field,
                ))
            })
            .collect()
    }
}

fn best_tag_match(query: &Query, tags: &BTreeMap<String, String>) -> Option<MatchScore> {
    tags.iter()
        .flat_map(|(k, v)| [score(query, k), score(query, v)])
        .flatten()
        .map(MatchScore::half_weight)
        .max_by_key(|m| m.score)
}

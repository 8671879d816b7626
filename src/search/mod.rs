//! # Search Engine
//!
//! Relevance scoring and ranking shared by both cache layers.
//!
//! A candidate string is scored against a query by a ladder where each tier
//! short-circuits the next. All comparisons are case-insensitive.
//!
//! | Tier      | Score |
//! |-----------|-------|
//! | exact     | 100   |
//! | prefix    | 80    |
//! | substring | 60    |
//! | fuzzy     | 1..=50|
//!
//! Fuzzy matching walks the query left to right and greedily finds each
//! character at or after the previous match. Query characters that cannot be
//! found are skipped; the match only counts when at least 70% of the query was
//! found. The score is `50 * coverage * density`, where coverage is the matched
//! share of the query and density is the matched share of the candidate window
//! between the first and last match.

pub mod index;

pub use index::VaultSearchIndex;

use serde::Serialize;
use std::cmp::Ordering;

use crate::domain::{MatchField, ResourceRef, SearchHit, VaultRecord};

pub const EXACT_SCORE: u8 = 100;
pub const PREFIX_SCORE: u8 = 80;
pub const SUBSTRING_SCORE: u8 = 60;
pub const FUZZY_MAX_SCORE: u8 = 50;

/// Minimum share of query characters a fuzzy match must find, in percent
pub const FUZZY_MIN_COVERAGE_PERCENT: usize = 70;

/// Which tier of the ladder produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Fuzzy,
    Substring,
    Prefix,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScore {
    pub kind: MatchKind,
    pub score: u8,
}

impl MatchScore {
    /// Score used for secondary fields (values, tags) so they never outrank a
    /// name match of the same tier
    pub fn half_weight(self) -> Self {
        Self { kind: self.kind, score: (self.score / 2).max(1) }
    }
}

/// Normalized search term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    chars: Vec<char>,
}

impl Query {
    /// Normalize a raw term. Empty and whitespace-only terms yield `None`.
    pub fn parse(term: &str) -> Option<Self> {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            return None;
        }
        let text = trimmed.to_lowercase();
        let chars = text.chars().collect();
        Some(Self { text, chars })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Score `candidate` against `query`, or `None` when nothing on the ladder matches
pub fn score(query: &Query, candidate: &str) -> Option<MatchScore> {
    let candidate = candidate.to_lowercase();

    if candidate == query.text {
        return Some(MatchScore { kind: MatchKind::Exact, score: EXACT_SCORE });
    }
    if candidate.starts_with(&query.text) {
        return Some(MatchScore { kind: MatchKind::Prefix, score: PREFIX_SCORE });
    }
    if candidate.contains(&query.text) {
        return Some(MatchScore { kind: MatchKind::Substring, score: SUBSTRING_SCORE });
    }

    fuzzy_score(&query.chars, &candidate)
        .map(|score| MatchScore { kind: MatchKind::Fuzzy, score })
}

/// Convenience wrapper scoring a raw term; 0 means no match
pub fn score_term(term: &str, candidate: &str) -> u8 {
    Query::parse(term).and_then(|q| score(&q, candidate)).map_or(0, |m| m.score)
}

fn fuzzy_score(query: &[char], candidate: &str) -> Option<u8> {
    let target: Vec<char> = candidate.chars().collect();
    if query.is_empty() || target.is_empty() {
        return None;
    }

    let mut position = 0usize;
    let mut matched = 0usize;
    let mut first: Option<usize> = None;
    let mut last = 0usize;

    for qc in query {
        if let Some(offset) = target[position..].iter().position(|tc| tc == qc) {
            let at = position + offset;
            first.get_or_insert(at);
            last = at;
            matched += 1;
            position = at + 1;
            if position >= target.len() {
                break;
            }
        }
    }

    let first = first?;
    if matched * 100 < query.len() * FUZZY_MIN_COVERAGE_PERCENT {
        return None;
    }

    let span = last - first + 1;
    let coverage = matched as f64 / query.len() as f64;
    let density = matched as f64 / span as f64;
    let raw = (f64::from(FUZZY_MAX_SCORE) * coverage * density).floor();

    Some((raw as u8).clamp(1, FUZZY_MAX_SCORE))
}

/// Ordering used for every result list: descending score, then shorter
/// name, then name, then vault identifier
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.vault_identifier.cmp(&b.vault_identifier))
        .then_with(|| a.resource_type.cmp(&b.resource_type))
}

/// Sort hits into their stable presentation order
pub fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(compare_hits);
}

/// Name-only search over one record; hits are unordered
pub fn search_record(record: &VaultRecord, query: &Query) -> Vec<SearchHit> {
    record
        .resources()
        .filter_map(|resource: ResourceRef<'_>| {
            score(query, resource.name()).map(|m| {
                SearchHit::new(
                    record.vault_identifier.clone(),
                    resource.to_meta(),
                    m.score,
                    MatchField::Name,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CertMeta, KeyMeta, SecretMeta};

    fn q(term: &str) -> Query {
        Query::parse(term).unwrap()
    }

    #[test]
    fn test_ladder_precedence() {
        let query = q("db");
        let exact = score(&query, "db").unwrap();
        let prefix = score(&query, "db-conn").unwrap();
        let substring = score(&query, "my-db-conn").unwrap();
        let fuzzy = score(&query, "dxb").unwrap();

        assert_eq!(exact.kind, MatchKind::Exact);
        assert_eq!(prefix.kind, MatchKind::Prefix);
        assert_eq!(substring.kind, MatchKind::Substring);
        assert_eq!(fuzzy.kind, MatchKind::Fuzzy);

        assert!(exact.score > prefix.score);
        assert!(prefix.score > substring.score);
        assert!(substring.score > fuzzy.score);
        assert!(fuzzy.score > 0);
    }

    #[test]
    fn test_no_match() {
        assert!(score(&q("xyz"), "db-conn").is_none());
        assert_eq!(score_term("xyz", "db-conn"), 0);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(score_term("DB", "db"), EXACT_SCORE);
        assert_eq!(score_term("db", "DB-Conn"), PREFIX_SCORE);
        assert_eq!(score_term("Conn", "my-db-CONN"), SUBSTRING_SCORE);
    }

    #[test]
    fn test_empty_and_whitespace_queries_match_nothing() {
        assert!(Query::parse("").is_none());
        assert!(Query::parse("   \t").is_none());
        assert_eq!(score_term("", "anything"), 0);
    }

    #[test]
    fn test_query_is_trimmed() {
        assert_eq!(score_term("  db ", "db"), EXACT_SCORE);
    }

    #[test]
    fn test_fuzzy_density() {
        // d..b adjacent-ish scores better than spread out
        let tight = score_term("db", "dxb");
        let loose = score_term("db", "dxxxxxxb");
        assert!(tight > loose);
        assert_eq!(tight, 33);
        assert!(loose >= 1);
    }

    #[test]
    fn test_fuzzy_skips_unmatched_characters() {
        // 9 of 10 query characters appear in order
        let m = score(&q("passwordzx"), "p-a-s-s-w-o-r-d-x").unwrap();
        assert_eq!(m.kind, MatchKind::Fuzzy);

        // 1 of 3 is below the coverage threshold
        assert!(score(&q("aqz"), "a").is_none());
    }

    #[test]
    fn test_half_weight() {
        let exact = MatchScore { kind: MatchKind::Exact, score: 100 };
        assert_eq!(exact.half_weight().score, 50);
        let weak = MatchScore { kind: MatchKind::Fuzzy, score: 1 };
        assert_eq!(weak.half_weight().score, 1);
    }

    #[test]
    fn test_rank_order() {
        let record = VaultRecord::new("kv-b")
            .with_secrets(vec![SecretMeta::named("my-db-conn"), SecretMeta::named("db")])
            .with_keys(vec![KeyMeta::named("db-conn"), KeyMeta::named("db-key")])
            .with_certificates(vec![CertMeta::named("dxb")]);
        let other = VaultRecord::new("kv-a").with_secrets(vec![SecretMeta::named("db")]);

        let query = q("db");
        let mut hits = search_record(&record, &query);
        hits.extend(search_record(&other, &query));
        rank(&mut hits);

        let order: Vec<_> =
            hits.iter().map(|h| (h.name.as_str(), h.vault_identifier.as_str())).collect();
        assert_eq!(
            order,
            vec![
                ("db", "kv-a"),
                ("db", "kv-b"),
                ("db-key", "kv-b"),
                ("db-conn", "kv-b"),
                ("my-db-conn", "kv-b"),
                ("dxb", "kv-b"),
            ]
        );
    }

    #[test]
    fn test_search_record_tags_hits_with_source() {
        let record = VaultRecord::new("kv")
            .with_certificates(vec![CertMeta::named("web-tls").with_tag("env", "prod")]);
        let hits = search_record(&record, &q("web"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].resource_type, crate::domain::ResourceType::Certificate);
        assert_eq!(hits[0].matched_on, MatchField::Name);
        assert_eq!(hits[0].source.name(), "web-tls");
    }
}

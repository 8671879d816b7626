//! Output formatting for CLI commands
//!
//! Every command prints JSON, YAML, or a plain-text table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::cache::{CacheStats, LoadOutcome};
use crate::domain::SearchHit;
use crate::indexing::{IndexFailure, PassReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

/// Print data as JSON or YAML; tables are rendered by the per-type printers
pub fn print_output_format<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(data),
        OutputFormat::Yaml => print_yaml(data),
        OutputFormat::Table => {
            anyhow::bail!("Table format requires custom implementation per data type")
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Truncate to at most `max_len` characters, ending in an ellipsis when cut
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a horizontal separator line
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    print_separator(total_width.saturating_sub(1));
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "-".to_string())
}

/// Search or expiration hits
pub fn print_hits_table(hits: &[SearchHit], now: DateTime<Utc>) {
    if hits.is_empty() {
        println!("No matches found");
        return;
    }

    print_table_header(&[
        ("Name", 30),
        ("Type", 11),
        ("Vault", 30),
        ("Score", 5),
        ("Expires", 10),
        ("Status", 13),
    ]);
    for hit in hits {
        println!(
            "{:<30} {:<11} {:<30} {:<5} {:<10} {}",
            truncate(&hit.name, 30),
            hit.resource_type.as_str(),
            truncate(&hit.vault_identifier, 30),
            hit.score,
            format_date(hit.expires_on()),
            hit.expiration_status(now).as_str()
        );
    }
    println!();
    println!("{} result(s)", hits.len());
}

pub fn print_stats_table(stats: &CacheStats) {
    print_table_header(&[("Metric", 20), ("Value", 20)]);
    let rows = [
        ("vaults", stats.vaults.to_string()),
        ("secrets", stats.secrets.to_string()),
        ("keys", stats.keys.to_string()),
        ("certificates", stats.certificates.to_string()),
        ("expired", stats.expired.to_string()),
        ("critical", stats.critical.to_string()),
        ("warning", stats.warning.to_string()),
        ("last_indexed", format_date(stats.last_indexed)),
    ];
    for (metric, value) in rows {
        println!("{:<20} {}", metric, value);
    }
}

pub fn print_report_table(report: &PassReport) {
    println!("Pass {} {}", report.pass_id, report.outcome.as_str());
    println!(
        "Indexed {}/{} vault(s) across {} subscription(s) in {} ms",
        report.vaults_indexed.len(),
        report.vaults_total,
        report.subscriptions_total,
        report.duration_ms
    );
    if let Some(warning) = &report.persistence_warning {
        println!("Warning: cache not saved: {}", warning);
    }

    if report.failures.is_empty() {
        return;
    }
    print_table_header(&[("Scope", 20), ("Target", 30), ("Reason", 50)]);
    for failure in &report.failures {
        let (scope, target, reason) = match failure {
            IndexFailure::SubscriptionListing { reason } => ("subscriptions", "-", reason),
            IndexFailure::Subscription { subscription_id, reason } => {
                ("subscription", subscription_id.as_str(), reason)
            }
            IndexFailure::Vault { vault, kind, reason } => (kind.as_str(), vault.as_str(), reason),
        };
        println!("{:<20} {:<30} {}", scope, truncate(target, 30), truncate(reason, 50));
    }
}

/// One line on stderr describing how the cache was loaded
pub fn describe_load(outcome: &LoadOutcome) -> String {
    match outcome {
        LoadOutcome::Fresh => "No cache found; starting empty".to_string(),
        LoadOutcome::Loaded { vaults } => format!("Loaded {} cached vault(s)", vaults),
        LoadOutcome::Reset { reason } => format!("Cache discarded: {}", reason),
    }
}

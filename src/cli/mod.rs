//! # Command Line Interface
//!
//! Indexes an inventory into the encrypted cache and queries it.
//!
//! The cache password is read from `VAULTDEX_CACHE_PASSWORD` or, when that is
//! unset, from the first line of stdin. It is never written anywhere.

pub mod output;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::SecretString;
use crate::indexing::spawn_scheduler;
use crate::observability::{init_observability, log_config_info};
use crate::services::VaultIndexService;
use crate::source::{InventoryDataSource, VaultDataSource};
use output::{
    describe_load, print_hits_table, print_output_format, print_report_table, print_stats_table,
    OutputFormat,
};

/// Environment variable holding the cache password
pub const PASSWORD_ENV: &str = "VAULTDEX_CACHE_PASSWORD";

/// Largest accepted `expiring --days` window
pub const MAX_WINDOW_DAYS: i64 = 36_500;

#[derive(Parser)]
#[command(name = "vaultdex")]
#[command(about = "Encrypted cross-vault search for secrets, keys and certificates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Cache directory override
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl every vault in an inventory file and update the cache
    Index {
        /// JSON inventory of subscriptions, vaults and their contents
        #[arg(long)]
        inventory: PathBuf,

        /// Keep running and re-index on the configured interval
        #[arg(long)]
        watch: bool,
    },

    /// Search cached secret, key and certificate names across all vaults
    Search {
        term: String,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List certificates (or secrets) expiring soon
    Expiring {
        /// Window in days
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(0..=MAX_WINDOW_DAYS))]
        days: i64,

        /// Report secrets instead of certificates
        #[arg(long)]
        secrets: bool,
    },

    /// Show cache counts and expiration totals
    Stats,

    /// Delete the cache
    Clear,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache.cache_dir = dir;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    let metrics = init_observability(&config.observability)?;
    log_config_info(&config);

    match cli.command {
        Commands::Index { inventory, watch } => {
            let password = read_password()?;
            let source = InventoryDataSource::from_file(&inventory)
                .await?
                .with_page_size(config.indexing.list_page_size);
            let source: Arc<dyn VaultDataSource> = Arc::new(source);
            let service =
                VaultIndexService::new(&config, source, Some(password.clone()), metrics)?;
            eprintln!("{}", describe_load(&service.load(&password).await));

            let report = service.run_indexing().await?;
            match cli.output {
                OutputFormat::Table => print_report_table(&report),
                format => print_output_format(&report, format)?,
            }

            if watch {
                watch_until_interrupted(&config, &service).await?;
                service.save(&password).await?;
            }
        }
        Commands::Search { term, limit } => {
            let service = open_service(&config, metrics).await?;
            let mut hits = service.global_search(&term).await;
            if let Some(limit) = limit {
                hits.truncate(limit);
            }
            match cli.output {
                OutputFormat::Table => print_hits_table(&hits, Utc::now()),
                format => print_output_format(&hits, format)?,
            }
        }
        Commands::Expiring { days, secrets } => {
            let service = open_service(&config, metrics).await?;
            let hits = if secrets {
                service.expiring_secrets(days).await
            } else {
                service.expiring_certificates(days).await
            };
            match cli.output {
                OutputFormat::Table => print_hits_table(&hits, Utc::now()),
                format => print_output_format(&hits, format)?,
            }
        }
        Commands::Stats => {
            let service = open_service(&config, metrics).await?;
            let stats = service.stats().await;
            match cli.output {
                OutputFormat::Table => print_stats_table(&stats),
                format => print_output_format(&stats, format)?,
            }
        }
        Commands::Clear => {
            let service = VaultIndexService::new(
                &config,
                Arc::new(InventoryDataSource::new(Default::default())),
                None,
                metrics,
            )?;
            service.clear_cache().await?;
            println!("Cache cleared: {}", config.cache.cache_dir.display());
        }
    }

    Ok(())
}

/// Build a query-only service and load the cache into it
async fn open_service(
    config: &AppConfig,
    metrics: crate::observability::MetricsRecorder,
) -> anyhow::Result<VaultIndexService> {
    let password = read_password()?;
    let source: Arc<dyn VaultDataSource> = Arc::new(InventoryDataSource::new(Default::default()));
    let service = VaultIndexService::new(config, source, None, metrics)?;
    eprintln!("{}", describe_load(&service.load(&password).await));
    Ok(service)
}

async fn watch_until_interrupted(
    config: &AppConfig,
    service: &VaultIndexService,
) -> anyhow::Result<()> {
    let Some(period) = config.indexing.reindex_interval() else {
        warn!("Re-indexing is disabled (VAULTDEX_REINDEX_INTERVAL_SECONDS=0); exiting");
        return Ok(());
    };

    let scheduler = spawn_scheduler(service.coordinator().clone(), period);
    info!(period_seconds = period.as_secs(), "Watching for changes; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    scheduler.shutdown();
    scheduler.join().await;
    if service.cancel_indexing().await {
        info!("Cancelled running pass");
    }
    Ok(())
}

fn read_password() -> anyhow::Result<SecretString> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return non_empty(password);
    }

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read cache password from stdin")?;
    non_empty(line.trim_end_matches(['\r', '\n']).to_string())
}

fn non_empty(password: String) -> anyhow::Result<SecretString> {
    if password.is_empty() {
        bail!("Cache password is empty; set {} or pipe it on stdin", PASSWORD_ENV);
    }
    Ok(SecretString::new(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_expiring() {
        let cli = Cli::try_parse_from(["vaultdex", "expiring", "--days", "60", "--secrets", "-o", "json"])
            .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Expiring { days, secrets } => {
                assert_eq!(days, 60);
                assert!(secrets);
            }
            _ => panic!("expected expiring"),
        }
    }

    #[test]
    fn test_expiring_days_bounded() {
        assert!(Cli::try_parse_from(["vaultdex", "expiring", "--days=-1"]).is_err());
        assert!(Cli::try_parse_from(["vaultdex", "expiring", "--days", "100000000"]).is_err());
        assert!(Cli::try_parse_from(["vaultdex", "expiring", "--days", "36500"]).is_ok());
    }

    #[test]
    fn test_index_requires_inventory() {
        assert!(Cli::try_parse_from(["vaultdex", "index"]).is_err());
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(non_empty(String::new()).is_err());
        assert_eq!(non_empty("pw".to_string()).unwrap().expose_secret(), "pw");
    }
}

//! # Metrics Collection
//!
//! Indexing, cache and search metrics emitted through the `metrics` facade.
//! [`install_exporter`] serves them on a Prometheus scrape endpoint; a process
//! embedding the library may install its own recorder instead.

use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Result, VaultdexError};

/// Install the global Prometheus recorder and its HTTP listener.
///
/// Does nothing when metrics are disabled. Must run inside a tokio runtime.
pub fn install_exporter(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let socket_addr = config.metrics_socket_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            VaultdexError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    info!(metrics_addr = %socket_addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Metrics recorder handed to the coordinator and the service
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder {
    enabled: bool,
}

impl MetricsRecorder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &ObservabilityConfig) -> Self {
        let recorder = Self::new(config.enable_metrics);
        if recorder.enabled {
            recorder.register_metrics();
            info!(service_name = %config.service_name, "Metrics collection enabled");
        }
        recorder
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a vault crawled and cached
    pub fn record_vault_indexed(&self, resources: usize) {
        if !self.enabled {
            return;
        }
        counter!("vaults_indexed_total").increment(1);
        histogram!("vault_resources_indexed").record(resources as f64);
    }

    /// Record a vault or subscription that could not be crawled
    pub fn record_index_failure(&self, kind: &str) {
        if !self.enabled {
            return;
        }
        counter!("vault_index_failures_total", "kind" => kind.to_string()).increment(1);
    }

    /// Update the running pass's progress gauge
    pub fn set_progress(&self, percent: u8) {
        if !self.enabled {
            return;
        }
        gauge!("indexing_progress_percent").set(f64::from(percent));
    }

    /// Record a finished pass
    pub fn record_pass(&self, outcome: &str, duration_seconds: f64) {
        if !self.enabled {
            return;
        }
        histogram!("indexing_pass_duration_seconds", "outcome" => outcome.to_string())
            .record(duration_seconds);
    }

    /// Record a persistent cache save attempt
    pub fn record_cache_save(&self, success: bool) {
        if !self.enabled {
            return;
        }
        let status = if success { "success" } else { "error" };
        counter!("cache_saves_total", "status" => status).increment(1);
    }

    /// Record a search against one cache layer
    pub fn record_search(&self, layer: &str, hits: usize) {
        if !self.enabled {
            return;
        }
        counter!("searches_total", "layer" => layer.to_string()).increment(1);
        histogram!("search_hits", "layer" => layer.to_string()).record(hits as f64);
    }

    /// Describe every metric and zero the counters so they appear before events occur
    pub fn register_metrics(&self) {
        describe_counter!("vaults_indexed_total", Unit::Count, "Vaults crawled and cached");
        describe_counter!(
            "vault_index_failures_total",
            Unit::Count,
            "Vault and subscription crawl failures grouped by kind"
        );
        describe_gauge!(
            "indexing_progress_percent",
            Unit::Percent,
            "Progress of the current indexing pass"
        );
        describe_histogram!(
            "indexing_pass_duration_seconds",
            Unit::Seconds,
            "Duration of indexing passes grouped by outcome"
        );
        describe_histogram!("vault_resources_indexed", Unit::Count, "Resources per crawled vault");
        describe_counter!("cache_saves_total", Unit::Count, "Persistent cache saves by status");
        describe_counter!("searches_total", Unit::Count, "Searches grouped by cache layer");
        describe_histogram!("search_hits", Unit::Count, "Hits returned per search");

        counter!("vaults_indexed_total").absolute(0);
        counter!("cache_saves_total", "status" => "success").absolute(0);
        counter!("cache_saves_total", "status" => "error").absolute(0);
        gauge!("indexing_progress_percent").set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_recorder_is_noop() {
        let recorder = MetricsRecorder::default();
        assert!(!recorder.is_enabled());
        recorder.record_vault_indexed(3);
        recorder.record_index_failure("timeout");
        recorder.set_progress(50);
        recorder.record_pass("completed", 1.5);
        recorder.record_cache_save(true);
        recorder.record_search("persistent", 2);
    }

    #[test]
    fn test_enabled_recorder_without_exporter() {
        let config = ObservabilityConfig { enable_metrics: true, ..Default::default() };
        let recorder = MetricsRecorder::from_config(&config);
        assert!(recorder.is_enabled());
        recorder.record_vault_indexed(10);
        recorder.record_search("session", 0);
    }

    #[test]
    fn test_exporter_skipped_when_disabled() {
        let config = ObservabilityConfig {
            enable_metrics: false,
            metrics_addr: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(install_exporter(&config).is_ok());
    }

    #[test]
    fn test_exporter_rejects_bad_address() {
        let config = ObservabilityConfig {
            enable_metrics: true,
            metrics_addr: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(matches!(install_exporter(&config), Err(VaultdexError::Config(_))));
    }

    #[tokio::test]
    async fn test_exporter_serves_recorded_metrics() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let config = ObservabilityConfig {
            enable_metrics: true,
            metrics_addr: format!("127.0.0.1:{}", port),
            ..Default::default()
        };
        install_exporter(&config).unwrap();
        let recorder = MetricsRecorder::from_config(&config);
        recorder.record_vault_indexed(4);

        let mut body = String::new();
        for _ in 0..50 {
            if let Ok(mut stream) = tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                stream
                    .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                    .await
                    .unwrap();
                stream.read_to_string(&mut body).await.unwrap();
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(body.contains("vaults_indexed_total"), "scrape output: {body}");
    }
}

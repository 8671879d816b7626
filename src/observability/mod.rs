//! # Observability Infrastructure
//!
//! Structured logging and metrics for vaultdex.

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, log_config_info};
pub use self::metrics::{install_exporter, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging, install the metrics exporter and build the recorder
pub fn init_observability(config: &ObservabilityConfig) -> Result<MetricsRecorder> {
    init_logging(config)?;
    install_exporter(config)?;
    let recorder = MetricsRecorder::from_config(config);

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "Observability initialized successfully"
    );

    Ok(recorder)
}

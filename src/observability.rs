//! Observability setup for the command line tools.
//!
//! This module provides:
//! - Structured logging with configurable level and format
//! - Metrics collection with a Prometheus recorder
//! - Optional Prometheus text exposition written at exit

pub mod metrics;
pub mod tracing_mod;

use anyhow::Result;

use crate::observability_config::ObservabilityConfig;

pub use self::metrics::MetricsTextfile;

/// Initialize the complete observability stack from environment variables
pub fn init_observability() -> Result<MetricsTextfile> {
    init_observability_with_config(ObservabilityConfig::from_env())
}

/// Initialize the complete observability stack with custom configuration.
///
/// Call [`MetricsTextfile::flush`] on the returned value before exiting to
/// write collected metrics to the configured file.
pub fn init_observability_with_config(config: ObservabilityConfig) -> Result<MetricsTextfile> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    tracing_mod::init_tracing_with_config(&config)?;
    let textfile = metrics::init_metrics_with_config(&config)?;

    tracing::info!(
        environment = %config.environment,
        log_format = %config.log_format,
        metrics_file = ?config.metrics_file,
        "Observability stack initialized successfully"
    );
    Ok(textfile)
}

//! Tracing and logging setup module.
//!
//! This module provides:
//! - Structured logging configuration (pretty or JSON)
//! - Tracing span creation utilities

use anyhow::Result;
use tracing_subscriber::prelude::*;

use crate::observability_config::ObservabilityConfig;

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    // Create the filter based on configuration
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("speck_meter={}", config.log_level.to_lowercase()).parse()?)
        .add_directive(
            format!("synthesize_training_images={}", config.log_level.to_lowercase()).parse()?,
        );

    // Segmentation internals log per ROI, so they get their own level
    if let Ok(level) = std::env::var("SEGMENTATION_LOG_LEVEL") {
        filter = filter.add_directive(format!("speck_segmentation={}", level).parse()?);
    }

    if config.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Create a span for the processing of one sheet
pub fn sheet_span(image: &str) -> tracing::Span {
    tracing::info_span!("sheet", image = image, component = "measurer")
}

/// Create a span for a batch run over a folder
pub fn batch_span(folder: &str, parallel: bool) -> tracing::Span {
    tracing::info_span!(
        "batch",
        folder = folder,
        parallel = parallel,
        component = "batch"
    )
}

/// Create a span for a report-only command
pub fn command_span(command: &str) -> tracing::Span {
    tracing::info_span!("command", command = command, component = "cli")
}

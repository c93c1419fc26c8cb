//! Metrics collection and Prometheus export module.
//!
//! This module provides:
//! - Prometheus recorder setup without an HTTP listener
//! - Text exposition written to a file when the run ends
//! - Metrics recording functions for sheets, batches and errors

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::observability_config::ObservabilityConfig;

/// Installed recorder plus the file its exposition is written to
#[derive(Clone)]
pub struct MetricsTextfile {
    handle: PrometheusHandle,
    path: Option<PathBuf>,
}

impl MetricsTextfile {
    /// Current exposition in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the exposition to the configured file, if any
    pub fn flush(&self) -> Result<()> {
        match &self.path {
            Some(path) => write_metrics_file(&self.handle, path),
            None => Ok(()),
        }
    }
}

/// Initialize metrics collection with Prometheus recorder and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<MetricsTextfile> {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(
        metrics_file = ?config.metrics_file,
        "Metrics collection initialized"
    );
    Ok(MetricsTextfile {
        handle,
        path: config.metrics_file.clone(),
    })
}

/// Writes the rendered exposition, replacing the file atomically
pub fn write_metrics_file(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, handle.render())
        .with_context(|| format!("Failed to write metrics to {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics file to {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Metrics textfile written");
    Ok(())
}

/// Record metrics for one measured sheet
pub fn record_sheet_metrics(rois: usize, speck_pixels: u64, duration: Duration) {
    metrics::counter!("sheets_processed_total").increment(1);
    metrics::counter!("rois_measured_total").increment(rois as u64);
    metrics::histogram!("sheet_measure_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("sheet_speck_pixels").record(speck_pixels as f64);
}

/// Record a sheet that was left out of the report
pub fn record_sheet_skipped(reason: &'static str) {
    metrics::counter!("sheets_skipped_total", "reason" => reason).increment(1);
}

/// Record totals of a finished batch
pub fn record_batch_metrics(sheets: usize, skipped: usize, duration: Duration) {
    metrics::gauge!("batch_sheets").set(sheets as f64);
    metrics::gauge!("batch_sheets_skipped").set(skipped as f64);
    metrics::histogram!("batch_duration_seconds").record(duration.as_secs_f64());

    let sheets_per_sec = if duration.as_secs_f64() > 0.0 {
        sheets as f64 / duration.as_secs_f64()
    } else {
        0.0
    };
    metrics::histogram!("batch_throughput_sheets_per_sec").record(sheets_per_sec);
}

/// Record error metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

/// Record report output
pub fn record_report_metrics(report: &'static str, rows: usize) {
    metrics::counter!("report_rows_written_total", "report" => report).increment(rows as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_sheet_metrics(3, 120, Duration::from_millis(5));
        record_sheet_skipped("decode");
        record_batch_metrics(2, 1, Duration::ZERO);
        record_error_metrics("image_decode", "batch");
        record_report_metrics("speck", 3);
    }

    #[test]
    fn test_write_metrics_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("speck.prom");

        // A recorder that is built but not installed globally
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        write_metrics_file(&handle, &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("speck.prom.tmp").exists());
    }
}

//! # Batch Processing
//!
//! Runs the measurer over every discovered sheet. A failing sheet is logged,
//! counted and skipped; the rest of the batch carries on. Sheets can be
//! dispatched on the rayon pool, and reports always come back in discovery
//! order so the CSV output does not depend on scheduling.

use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::info;

use crate::annotation::Annotation;
use crate::discovery::SheetPair;
use crate::errors::{error_logging, SpeckError, SpeckResult};
use crate::export::SpeckExporter;
use crate::measurer::{load_sheet, SpeckMeasurement, SpeckMeasurer};
use crate::observability::metrics::{
    record_batch_metrics, record_error_metrics, record_sheet_metrics, record_sheet_skipped,
};
use crate::observability::tracing_mod::sheet_span;
use crate::report::{PixelRow, SpeckRow};
use crate::sheet::Sheet;

/// Measurements of one sheet
#[derive(Debug, Clone)]
pub struct SheetReport {
    pub image: String,
    pub sheet: Sheet,
    pub measurements: Vec<SpeckMeasurement>,
    /// Crop and mask files written for this sheet
    pub files_written: usize,
}

impl SheetReport {
    pub fn speck_rows(&self, decimals: u32) -> Vec<SpeckRow> {
        self.measurements
            .iter()
            .map(|m| SpeckRow::new(&self.sheet, m, decimals))
            .collect()
    }

    pub fn pixel_rows(&self) -> Vec<PixelRow> {
        self.measurements
            .iter()
            .map(|m| PixelRow::new(self.sheet.width(), self.sheet.height(), m))
            .collect()
    }

    pub fn speck_pixels(&self) -> u64 {
        self.measurements.iter().map(|m| m.dark_px).sum()
    }
}

/// A sheet left out of the batch and why
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSheet {
    pub image: String,
    pub error: SpeckError,
}

/// Counters of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub sheets_processed: usize,
    pub sheets_skipped: usize,
    pub rois_measured: usize,
    pub duration: Duration,
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub reports: Vec<SheetReport>,
    pub skipped: Vec<SkippedSheet>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    /// Speck report rows of all sheets, in discovery then ROI order
    pub fn speck_rows(&self, decimals: u32) -> Vec<SpeckRow> {
        self.reports
            .iter()
            .flat_map(|r| r.speck_rows(decimals))
            .collect()
    }

    /// Pixel report rows of all sheets, in discovery then ROI order
    pub fn pixel_rows(&self) -> Vec<PixelRow> {
        self.reports.iter().flat_map(|r| r.pixel_rows()).collect()
    }
}

/// Decodes, measures and optionally exports one sheet.
///
/// # Errors
///
/// * `SpeckError::ImageDecode` if the image cannot be read
/// * `SpeckError::AnnotationParse` if the annotation cannot be read
/// * `SpeckError::FileSystem` if a crop or mask cannot be written
pub fn process_sheet(
    pair: &SheetPair,
    measurer: &SpeckMeasurer,
    exporter: &SpeckExporter,
) -> SpeckResult<SheetReport> {
    let start_time = Instant::now();
    let image = pair.image_name();
    let config = measurer.config();

    let sheet_image = load_sheet(&pair.image)?;
    let annotation = Annotation::from_path(&pair.annotation)?;
    let sheet = config.sheet(sheet_image.width(), sheet_image.height())?;
    let rois = annotation.speck_rois(&config.marker_filter());

    let detailed =
        measurer.measure_detailed(&image, &sheet_image, &rois, sheet.scale_mm2_per_px2())?;

    let mut files_written = 0;
    if !exporter.is_disabled() {
        for item in &detailed {
            let files = exporter.export(item)?;
            files_written += files.crop.is_some() as usize + files.mask.is_some() as usize;
        }
    }

    let measurements: Vec<SpeckMeasurement> = detailed.into_iter().map(|d| d.measurement).collect();
    let report = SheetReport {
        image,
        sheet,
        measurements,
        files_written,
    };

    let duration = start_time.elapsed();
    record_sheet_metrics(report.measurements.len(), report.speck_pixels(), duration);
    info!(
        image = %report.image,
        width = report.sheet.width(),
        height = report.sheet.height(),
        rois = report.measurements.len(),
        scale_mm2_per_px2 = report.sheet.scale_mm2_per_px2(),
        duration_ms = duration.as_millis() as u64,
        "Sheet measured"
    );

    Ok(report)
}

fn process_logged(
    pair: &SheetPair,
    measurer: &SpeckMeasurer,
    exporter: &SpeckExporter,
) -> Result<SheetReport, SkippedSheet> {
    let image = pair.image_name();
    let _span = sheet_span(&image).entered();

    process_sheet(pair, measurer, exporter).map_err(|error| {
        let annotation = pair.annotation.display().to_string();
        error_logging::log_sheet_error(&error, "process_sheet", &image, Some(&annotation));
        record_sheet_skipped(error.kind());
        record_error_metrics(error.kind(), "batch");
        SkippedSheet { image, error }
    })
}

/// Processes every sheet of `pairs`, skipping those that fail.
pub fn run_batch(
    pairs: &[SheetPair],
    measurer: &SpeckMeasurer,
    exporter: &SpeckExporter,
    parallel: bool,
) -> BatchOutcome {
    let start_time = Instant::now();

    // Indexed parallel collect keeps input order
    let results: Vec<Result<SheetReport, SkippedSheet>> = if parallel {
        pairs
            .par_iter()
            .map(|pair| process_logged(pair, measurer, exporter))
            .collect()
    } else {
        pairs
            .iter()
            .map(|pair| process_logged(pair, measurer, exporter))
            .collect()
    };

    let mut outcome = BatchOutcome::default();
    for result in results {
        match result {
            Ok(report) => outcome.reports.push(report),
            Err(skipped) => outcome.skipped.push(skipped),
        }
    }

    outcome.summary = BatchSummary {
        sheets_processed: outcome.reports.len(),
        sheets_skipped: outcome.skipped.len(),
        rois_measured: outcome.reports.iter().map(|r| r.measurements.len()).sum(),
        duration: start_time.elapsed(),
    };
    record_batch_metrics(
        outcome.summary.sheets_processed,
        outcome.summary.sheets_skipped,
        outcome.summary.duration,
    );

    info!(
        sheets_processed = outcome.summary.sheets_processed,
        sheets_skipped = outcome.summary.sheets_skipped,
        rois_measured = outcome.summary.rois_measured,
        parallel,
        duration_ms = outcome.summary.duration.as_millis() as u64,
        "Batch complete"
    );

    outcome
}

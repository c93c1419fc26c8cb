//! # CSV Reports
//!
//! Row types for the speck report (pixel and mm² areas) and for the
//! pixel-only report, plus CSV writers and a reader for the speck report.
//! Rows come out in the order they are given, which is sheet discovery
//! order followed by ROI order within each sheet.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::errors::{error_logging, SpeckError, SpeckResult};
use crate::measurer::{round_to, SpeckMeasurement};
use crate::sheet::Sheet;

/// Column order of the speck report
pub const SPECK_REPORT_HEADER: [&str; 10] = [
    "image",
    "label",
    "width_px",
    "height_px",
    "sheet_px",
    "sheet_mm2",
    "roi_px",
    "roi_mm2",
    "dark_px",
    "dark_mm2",
];

/// Column order of the pixel-only report
pub const PIXEL_REPORT_HEADER: [&str; 5] = ["image", "label", "img_px", "roi_px", "dark_px"];

/// One row of the speck report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeckRow {
    pub image: String,
    pub label: String,
    pub width_px: u32,
    pub height_px: u32,
    /// Sheet pixel area under the configured convention, rounded
    pub sheet_px: u64,
    pub sheet_mm2: f64,
    pub roi_px: u64,
    pub roi_mm2: f64,
    pub dark_px: u64,
    pub dark_mm2: f64,
}

impl SpeckRow {
    pub fn new(sheet: &Sheet, measurement: &SpeckMeasurement, decimals: u32) -> Self {
        Self {
            image: measurement.image.clone(),
            label: measurement.label.clone(),
            width_px: sheet.width(),
            height_px: sheet.height(),
            sheet_px: sheet.pixel_area().round() as u64,
            sheet_mm2: round_to(sheet.physical_area_mm2(), decimals),
            roi_px: measurement.roi_px,
            roi_mm2: measurement.roi_mm2,
            dark_px: measurement.dark_px,
            dark_mm2: measurement.dark_mm2,
        }
    }
}

/// One row of the pixel-only report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelRow {
    pub image: String,
    pub label: String,
    /// Total pixels of the sheet image
    pub img_px: u64,
    pub roi_px: u64,
    pub dark_px: u64,
}

impl PixelRow {
    pub fn new(width: u32, height: u32, measurement: &SpeckMeasurement) -> Self {
        Self {
            image: measurement.image.clone(),
            label: measurement.label.clone(),
            img_px: width as u64 * height as u64,
            roi_px: measurement.roi_px,
            dark_px: measurement.dark_px,
        }
    }
}

/// Serializes `rows` as CSV with a header line.
///
/// The header is written even when `rows` is empty, so an empty batch still
/// produces a well-formed report.
pub fn write_rows<W, T>(writer: W, header: &[&str], rows: &[T]) -> SpeckResult<()>
where
    W: Write,
    T: Serialize,
{
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv_writer.write_record(header)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer
        .flush()
        .map_err(|e| SpeckError::Report(format!("Failed to flush CSV output: {}", e)))?;
    Ok(())
}

/// Writes the speck report to `path`, creating parent directories.
pub fn write_speck_report(path: &Path, rows: &[SpeckRow]) -> SpeckResult<()> {
    let file = create_report_file(path)?;
    write_rows(file, &SPECK_REPORT_HEADER, rows)
        .inspect_err(|e| log_report_error(e, "write_speck_report", path))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Speck report written");
    Ok(())
}

/// Writes the pixel-only report to `path`, creating parent directories.
pub fn write_pixel_report(path: &Path, rows: &[PixelRow]) -> SpeckResult<()> {
    let file = create_report_file(path)?;
    write_rows(file, &PIXEL_REPORT_HEADER, rows)
        .inspect_err(|e| log_report_error(e, "write_pixel_report", path))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Pixel report written");
    Ok(())
}

/// Parses speck report rows from CSV text.
pub fn read_speck_rows<R: Read>(reader: R) -> SpeckResult<Vec<SpeckRow>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for record in csv_reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Reads a speck report previously written by [`write_speck_report`].
pub fn read_speck_report(path: &Path) -> SpeckResult<Vec<SpeckRow>> {
    let file = fs::File::open(path).map_err(|e| {
        SpeckError::FileSystem(format!("Failed to open report '{}': {}", path.display(), e))
    })?;
    read_speck_rows(file)
}

pub(crate) fn create_report_file(path: &Path) -> SpeckResult<fs::File> {
    open_report_file(path).inspect_err(|e| log_report_error(e, "create_report", path))
}

fn open_report_file(path: &Path) -> SpeckResult<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            SpeckError::FileSystem(format!(
                "Failed to create report directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    fs::File::create(path).map_err(|e| {
        SpeckError::FileSystem(format!("Failed to create report '{}': {}", path.display(), e))
    })
}

fn log_report_error(error: &SpeckError, operation: &str, path: &Path) {
    error_logging::log_report_error(error, operation, &path.display().to_string());
}

//! # Rectangle Area Report
//!
//! Converts the drawn area of every annotated rectangle into mm² without
//! looking at pixel intensities. The sheet's pixel area is taken as the
//! inscribed circle `π·(min(w,h)/2)²` of each image, and a filling factor
//! corrects for the background a rectangle encloses around a round speck.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::annotation::Annotation;
use crate::discovery::{file_name, list_files, RECT_REPORT_EXTENSIONS};
use crate::errors::{SpeckError, SpeckResult};
use crate::report::create_report_file;

pub const DEFAULT_DISC_RADIUS_MM: f64 = 82.5;
pub const DEFAULT_FILLING_FACTOR: f64 = 0.70;
pub const DEFAULT_LARGE_SPOT_MM2: f64 = 0.40;

/// Constants of the rectangle conversion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectReportConfig {
    /// Radius of the physical disc in millimeters
    pub radius_mm: f64,
    /// Share of a rectangle actually covered by the spot
    pub filling_factor: f64,
    /// Adjusted area from which a spot counts as large
    pub threshold_mm2: f64,
}

impl Default for RectReportConfig {
    fn default() -> Self {
        Self {
            radius_mm: DEFAULT_DISC_RADIUS_MM,
            filling_factor: DEFAULT_FILLING_FACTOR,
            threshold_mm2: DEFAULT_LARGE_SPOT_MM2,
        }
    }
}

impl RectReportConfig {
    pub fn validate(&self) -> SpeckResult<()> {
        if !self.radius_mm.is_finite() || self.radius_mm <= 0.0 {
            return Err(SpeckError::Config(format!(
                "Disc radius must be positive, got {}",
                self.radius_mm
            )));
        }
        if !(self.filling_factor > 0.0 && self.filling_factor <= 1.0) {
            return Err(SpeckError::Config(format!(
                "Filling factor must be in (0, 1], got {}",
                self.filling_factor
            )));
        }
        if !self.threshold_mm2.is_finite() || self.threshold_mm2 < 0.0 {
            return Err(SpeckError::Config(format!(
                "Large-spot threshold cannot be negative, got {}",
                self.threshold_mm2
            )));
        }
        Ok(())
    }

    pub fn disc_area_mm2(&self) -> f64 {
        PI * self.radius_mm * self.radius_mm
    }
}

/// Size of one scanned image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub file: String,
    pub width_px: u32,
    pub height_px: u32,
    pub circle_area_px2: f64,
}

impl ImageRecord {
    pub fn new(file: impl Into<String>, width_px: u32, height_px: u32) -> Self {
        let radius = width_px.min(height_px) as f64 / 2.0;
        Self {
            file: file.into(),
            width_px,
            height_px,
            circle_area_px2: PI * radius * radius,
        }
    }
}

/// Converted area of one rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectRow {
    pub json_file: String,
    pub label: String,
    pub pixel_area: f64,
    pub mm2_raw: f64,
    pub mm2_adj: f64,
}

/// Totals over all converted rectangles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RectSummary {
    pub rectangles: usize,
    pub total_adj_mm2: f64,
    pub large_count: usize,
    pub large_sum_mm2: f64,
    pub skipped_annotations: usize,
}

/// Reads the dimensions of every raster image in `dir`, sorted by file name.
///
/// Only headers are decoded. Unreadable files are logged and left out.
pub fn scan_images(dir: &Path) -> SpeckResult<Vec<ImageRecord>> {
    let mut records = Vec::new();
    for path in list_files(dir, RECT_REPORT_EXTENSIONS)? {
        match image::image_dimensions(&path) {
            Ok((width, height)) => records.push(ImageRecord::new(file_name(&path), width, height)),
            Err(e) => {
                warn!(image = %path.display(), error = %e, "Could not read image size, skipped")
            }
        }
    }
    Ok(records)
}

/// Converts the rectangles of every annotation file in `json_files`.
///
/// Each annotation is matched to a scanned image through its `imagePath`;
/// annotations naming an image that was not scanned, or that cannot be
/// parsed, are skipped with a warning.
pub fn convert_rectangles(
    json_files: &[PathBuf],
    images: &[ImageRecord],
    config: &RectReportConfig,
) -> SpeckResult<(Vec<RectRow>, RectSummary)> {
    config.validate()?;

    let by_name: HashMap<&str, &ImageRecord> =
        images.iter().map(|r| (r.file.as_str(), r)).collect();
    let disc_area = config.disc_area_mm2();

    let mut rows = Vec::new();
    let mut summary = RectSummary::default();

    for json_path in json_files {
        let json_file = file_name(json_path);
        let annotation = match Annotation::from_path(json_path) {
            Ok(annotation) => annotation,
            Err(e) => {
                warn!(annotation = %json_file, error = %e, "Unreadable annotation, skipped");
                summary.skipped_annotations += 1;
                continue;
            }
        };

        let image_name = annotation.image_file_name().unwrap_or_default();
        let Some(record) = by_name.get(image_name) else {
            warn!(annotation = %json_file, image = %image_name, "Image not found, skipped");
            summary.skipped_annotations += 1;
            continue;
        };
        if record.circle_area_px2 <= 0.0 {
            warn!(annotation = %json_file, image = %image_name, "Image has no pixels, skipped");
            summary.skipped_annotations += 1;
            continue;
        }

        let mm2_per_px = disc_area / record.circle_area_px2;
        for roi in annotation.rectangles() {
            let pixel_area = roi.drawn_area();
            let mm2_raw = pixel_area * mm2_per_px;
            let mm2_adj = mm2_raw * config.filling_factor;

            summary.rectangles += 1;
            summary.total_adj_mm2 += mm2_adj;
            if mm2_adj >= config.threshold_mm2 {
                summary.large_count += 1;
                summary.large_sum_mm2 += mm2_adj;
            }

            rows.push(RectRow {
                json_file: json_file.clone(),
                label: roi.label,
                pixel_area,
                mm2_raw,
                mm2_adj,
            });
        }
    }

    info!(
        rectangles = summary.rectangles,
        total_adj_mm2 = summary.total_adj_mm2,
        large_spots = summary.large_count,
        large_sum_mm2 = summary.large_sum_mm2,
        threshold_mm2 = config.threshold_mm2,
        "Rectangle conversion complete"
    );

    Ok((rows, summary))
}

/// Writes `file,width_px,height_px,circle_area_px2` rows.
pub fn write_images_csv(path: &Path, records: &[ImageRecord]) -> SpeckResult<()> {
    let mut writer = csv::Writer::from_writer(create_report_file(path)?);
    writer.write_record(["file", "width_px", "height_px", "circle_area_px2"])?;
    for record in records {
        writer.write_record([
            record.file.clone(),
            record.width_px.to_string(),
            record.height_px.to_string(),
            format!("{:.1}", record.circle_area_px2),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `json_file,label,pixel_area,mm2_raw,mm2_adj` rows.
pub fn write_rects_csv(path: &Path, rows: &[RectRow]) -> SpeckResult<()> {
    let mut writer = csv::Writer::from_writer(create_report_file(path)?);
    writer.write_record(["json_file", "label", "pixel_area", "mm2_raw", "mm2_adj"])?;
    for row in rows {
        writer.write_record([
            row.json_file.clone(),
            row.label.clone(),
            format!("{:.1}", row.pixel_area),
            format!("{:.3}", row.mm2_raw),
            format!("{:.3}", row.mm2_adj),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    const RECT_JSON: &str = r#"{
        "imagePath": "disc.png",
        "shapes": [
            {"label": "big", "points": [[0, 0], [100, 50]], "shape_type": "rectangle"},
            {"points": [[10.5, 10], [12.5, 11]], "shape_type": "rectangle"},
            {"label": "line", "points": [[0, 0], [5, 5]], "shape_type": "line"}
        ]
    }"#;

    #[test]
    fn test_image_record_circle_area() {
        let record = ImageRecord::new("disc.png", 300, 200);
        assert!((record.circle_area_px2 - PI * 10000.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_validation() {
        assert!(RectReportConfig::default().validate().is_ok());
        let config = RectReportConfig {
            filling_factor: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_convert_rectangles() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("disc.json");
        fs::write(&json, RECT_JSON).unwrap();

        // Circle of radius 82.5 px: one pixel is one mm²
        let images = vec![ImageRecord::new("disc.png", 165, 165)];
        let (rows, summary) =
            convert_rectangles(&[json], &images, &RectReportConfig::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "big");
        assert!((rows[0].pixel_area - 5000.0).abs() < 1e-9);
        assert!((rows[0].mm2_raw - 5000.0).abs() < 1e-6);
        assert!((rows[0].mm2_adj - 3500.0).abs() < 1e-6);
        assert_eq!(rows[1].label, "rect");
        assert!((rows[1].mm2_adj - 1.4).abs() < 1e-9);

        assert_eq!(summary.rectangles, 2);
        assert_eq!(summary.large_count, 2);
        assert!((summary.total_adj_mm2 - 3501.4).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_image_is_skipped() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("disc.json");
        fs::write(&json, RECT_JSON).unwrap();

        let images = vec![ImageRecord::new("other.png", 165, 165)];
        let (rows, summary) =
            convert_rectangles(&[json], &images, &RectReportConfig::default()).unwrap();

        assert!(rows.is_empty());
        assert_eq!(summary.skipped_annotations, 1);
    }

    #[test]
    fn test_scan_and_write_csv() {
        let dir = TempDir::new().unwrap();
        RgbImage::from_pixel(40, 20, Rgb([200, 200, 200]))
            .save(dir.path().join("a.png"))
            .unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();

        let records = scan_images(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].width_px, records[0].height_px), (40, 20));

        let out = dir.path().join("out/images.csv");
        write_images_csv(&out, &records).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text, "file,width_px,height_px,circle_area_px2\na.png,40,20,314.2\n");
    }

    #[test]
    fn test_write_rects_csv_decimals() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("rects.csv");
        let rows = vec![RectRow {
            json_file: "a.json".to_string(),
            label: "S1".to_string(),
            pixel_area: 12.0,
            mm2_raw: 0.123456,
            mm2_adj: 0.0864192,
        }];

        write_rects_csv(&out, &rows).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.ends_with("a.json,S1,12.0,0.123,0.086\n"));
    }
}

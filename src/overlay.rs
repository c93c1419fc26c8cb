//! # Overlay Coverage
//!
//! Counts speck pixels painted red on an overlay image, for comparing hand
//! or tool-made overlays with the automatic masks. Red is tested in HSV on
//! the 8-bit scale where hue runs 0..180, with two bands either side of 0°.

use image::{Rgb, RgbImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::discovery::{file_name, list_files};
use crate::errors::{SpeckError, SpeckResult};
use crate::measurer::load_sheet;
use crate::report::create_report_file;

const RED_HUE_BANDS: [(u8, u8); 2] = [(0, 10), (170, 180)];
const MIN_SATURATION: u8 = 50;
const MIN_VALUE: u8 = 50;

/// File-name prefix that marks an overlay next to its crop
pub const OVERLAY_PREFIX: &str = "overlay_";

/// Red pixel count of one overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayCoverage {
    pub file: String,
    pub dark_px: u64,
    pub roi_px: u64,
    #[serde(rename = "dark_px/roi_px")]
    pub ratio: f64,
}

/// Converts an RGB pixel to 8-bit HSV with hue halved to 0..180.
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> (u8, u8, u8) {
    let [r, g, b] = pixel.0.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let saturation = if max > 0.0 { diff * 255.0 / max } else { 0.0 };

    let mut hue = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    (
        (hue / 2.0).round() as u8,
        saturation.round() as u8,
        max as u8,
    )
}

/// True when `pixel` falls in one of the red bands
pub fn is_red(pixel: &Rgb<u8>) -> bool {
    let (h, s, v) = rgb_to_hsv(pixel);
    s >= MIN_SATURATION
        && v >= MIN_VALUE
        && RED_HUE_BANDS.iter().any(|&(low, high)| h >= low && h <= high)
}

/// Counts red pixels of `overlay` against the pixel count of `crop`.
///
/// # Errors
///
/// Returns `SpeckError::Validation` when the two images differ in size.
pub fn overlay_coverage(
    file: &str,
    crop: &RgbImage,
    overlay: &RgbImage,
) -> SpeckResult<OverlayCoverage> {
    if crop.dimensions() != overlay.dimensions() {
        return Err(SpeckError::Validation(format!(
            "Size mismatch for {}: crop is {:?}, overlay is {:?}",
            file,
            crop.dimensions(),
            overlay.dimensions()
        )));
    }

    let dark_px = overlay.pixels().filter(|p| is_red(p)).count() as u64;
    let roi_px = crop.width() as u64 * crop.height() as u64;
    let ratio = if roi_px > 0 {
        dark_px as f64 / roi_px as f64
    } else {
        0.0
    };

    Ok(OverlayCoverage {
        file: file.to_string(),
        dark_px,
        roi_px,
        ratio,
    })
}

/// Path of the overlay belonging to `crop`: `overlay_<crop file name>.png`
pub fn overlay_path_for(crop: &Path) -> PathBuf {
    let name = format!("{}{}.png", OVERLAY_PREFIX, file_name(crop));
    crop.with_file_name(name)
}

/// Measures every crop in `dir` that has an overlay beside it.
///
/// Crops without an overlay, or that cannot be decoded, are skipped with a
/// warning. A size mismatch aborts the scan.
pub fn measure_overlay_dir(dir: &Path, extensions: &[&str]) -> SpeckResult<Vec<OverlayCoverage>> {
    let mut results = Vec::new();
    for crop_path in list_files(dir, extensions)? {
        let name = file_name(&crop_path);
        if name.starts_with(OVERLAY_PREFIX) {
            continue;
        }

        let overlay_path = overlay_path_for(&crop_path);
        if !overlay_path.exists() {
            warn!(crop = %name, overlay = %overlay_path.display(), "Overlay missing, skipped");
            continue;
        }

        let (crop, overlay) = match (load_sheet(&crop_path), load_sheet(&overlay_path)) {
            (Ok(crop), Ok(overlay)) => (crop, overlay),
            (Err(e), _) | (_, Err(e)) => {
                warn!(crop = %name, error = %e, "Could not read crop or overlay, skipped");
                continue;
            }
        };

        results.push(overlay_coverage(&name, &crop, &overlay)?);
    }
    Ok(results)
}

/// Writes `file,dark_px,roi_px,dark_px/roi_px` rows.
pub fn write_coverage_csv(path: &Path, rows: &[OverlayCoverage]) -> SpeckResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(create_report_file(path)?);
    writer.write_record(["file", "dark_px", "roi_px", "dark_px/roi_px"])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

//! # Bilateral Filter Calibration
//!
//! Searches a grid of bilateral pre-filter parameters for the setting whose
//! automatic speck areas agree best with hand measurements. Agreement is the
//! sample standard deviation of the per-ROI percentage error
//! `|hand - auto| / hand * 100`; lower is better.
//!
//! Ground-truth rows name exported crop files (`<stem>_<label>_<n>.png`), so
//! sheets are decoded once and the matching ROI crops kept in memory while
//! the grid is swept.

use image::{imageops, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::annotation::Annotation;
use crate::config::MeasurementConfig;
use crate::discovery::SheetPair;
use crate::errors::{SpeckError, SpeckResult};
use crate::measurer::{crop_stem, load_sheet, SpeckMeasurer};
use crate::report::create_report_file;
use crate::segmentation::{CleanupMode, PreFilter};

/// One hand-measured ROI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Crop file name, `<stem>_<label>_<n>.png`
    pub image: String,
    #[serde(rename = "dark_px_by hand_mm2")]
    pub hand_mm2: f64,
}

pub fn read_ground_truth(path: &Path) -> SpeckResult<Vec<GroundTruth>> {
    let file = fs::File::open(path).map_err(|e| {
        SpeckError::FileSystem(format!("Failed to open ground truth '{}': {}", path.display(), e))
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Parameter values swept by [`calibrate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationGrid {
    pub diameters: Vec<u32>,
    pub sigma_colors: Vec<f32>,
    pub sigma_spaces: Vec<f32>,
}

impl Default for CalibrationGrid {
    fn default() -> Self {
        Self {
            diameters: (5..=30).step_by(5).collect(),
            sigma_colors: (5..=40).step_by(5).map(|v| v as f32).collect(),
            sigma_spaces: (5..=30).step_by(5).map(|v| v as f32).collect(),
        }
    }
}

impl CalibrationGrid {
    pub fn len(&self) -> usize {
        self.diameters.len() * self.sigma_colors.len() * self.sigma_spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every bilateral setting of the grid, diameters outermost
    pub fn filters(&self) -> Vec<PreFilter> {
        let mut filters = Vec::with_capacity(self.len());
        for &diameter in &self.diameters {
            for &sigma_color in &self.sigma_colors {
                for &sigma_space in &self.sigma_spaces {
                    filters.push(PreFilter::Bilateral {
                        diameter,
                        sigma_color,
                        sigma_space,
                    });
                }
            }
        }
        filters
    }
}

/// A hand-measured ROI crop ready to be re-segmented
#[derive(Debug, Clone)]
pub struct CalibrationSample {
    pub image: String,
    pub crop: RgbImage,
    pub scale_mm2_per_px2: f64,
    pub hand_mm2: f64,
}

/// Automatic result for one ground-truth ROI under the chosen setting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationRow {
    pub image: String,
    pub hand_mm2: f64,
    pub auto_mm2: f64,
    pub error_pct: f64,
}

/// Best setting found by [`calibrate`]
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub pre_filter: PreFilter,
    pub error_std: f64,
    pub rows: Vec<CalibrationRow>,
    pub evaluated: usize,
}

/// Collects the ROI crops of `pairs` that appear in `ground_truth`.
///
/// ROIs are numbered as in the speck report, so a crop named by an earlier
/// export run is found again. Ground-truth rows with a non-positive hand
/// area, or that match no ROI, are left out with a warning.
pub fn load_samples(
    pairs: &[SheetPair],
    ground_truth: &[GroundTruth],
    config: &MeasurementConfig,
) -> SpeckResult<Vec<CalibrationSample>> {
    let mut wanted: HashMap<&str, f64> = HashMap::new();
    for truth in ground_truth {
        if truth.hand_mm2 > 0.0 && truth.hand_mm2.is_finite() {
            wanted.insert(truth.image.as_str(), truth.hand_mm2);
        } else {
            warn!(
                image = %truth.image,
                hand_mm2 = truth.hand_mm2,
                "Ground truth area must be positive, row ignored"
            );
        }
    }

    let filter = config.marker_filter();
    let mut samples = Vec::new();

    for pair in pairs {
        let image_name = pair.image_name();
        let (sheet_image, annotation) =
            match (load_sheet(&pair.image), Annotation::from_path(&pair.annotation)) {
                (Ok(img), Ok(annotation)) => (img, annotation),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(image = %image_name, error = %e, "Sheet skipped during calibration");
                    continue;
                }
            };

        let sheet = config.sheet(sheet_image.width(), sheet_image.height())?;
        for (index, roi) in annotation.speck_rois(&filter).iter().enumerate() {
            let crop_name = format!("{}.png", crop_stem(&image_name, &roi.label, index + 1));
            let Some(&hand_mm2) = wanted.get(crop_name.as_str()) else {
                continue;
            };

            let rect = roi.clamp_to(sheet_image.width(), sheet_image.height());
            if rect.is_empty() {
                warn!(image = %crop_name, "Ground truth ROI has no pixels, ignored");
                continue;
            }

            samples.push(CalibrationSample {
                image: crop_name,
                crop: imageops::crop_imm(
                    &sheet_image,
                    rect.x1,
                    rect.y1,
                    rect.width(),
                    rect.height(),
                )
                .to_image(),
                scale_mm2_per_px2: sheet.scale_mm2_per_px2(),
                hand_mm2,
            });
        }
    }

    if samples.len() < wanted.len() {
        warn!(
            matched = samples.len(),
            wanted = wanted.len(),
            "Some ground truth rows match no ROI"
        );
    }

    Ok(samples)
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

fn evaluate(samples: &[CalibrationSample], measurer: &SpeckMeasurer) -> Vec<CalibrationRow> {
    samples
        .par_iter()
        .map(|sample| {
            let result = measurer.segment(&sample.crop);
            let auto_mm2 = result.speck_pixels as f64 * sample.scale_mm2_per_px2;
            CalibrationRow {
                image: sample.image.clone(),
                hand_mm2: sample.hand_mm2,
                auto_mm2,
                error_pct: (sample.hand_mm2 - auto_mm2).abs() / sample.hand_mm2 * 100.0,
            }
        })
        .collect()
}

/// Sweeps `grid` and returns the setting with the smallest error spread.
///
/// A later setting replaces the current best only when strictly better, so
/// ties keep the first setting in grid order.
///
/// # Errors
///
/// Returns `SpeckError::Validation` for an empty grid or fewer than two
/// samples.
pub fn calibrate(
    samples: &[CalibrationSample],
    grid: &CalibrationGrid,
    cleanup: CleanupMode,
) -> SpeckResult<CalibrationOutcome> {
    if grid.is_empty() {
        return Err(SpeckError::Validation("Calibration grid is empty".to_string()));
    }
    if samples.len() < 2 {
        return Err(SpeckError::Validation(format!(
            "Calibration needs at least two ground truth ROIs, found {}",
            samples.len()
        )));
    }
    let measurers = grid
        .filters()
        .into_iter()
        .map(|pre_filter| {
            pre_filter.validate().map_err(SpeckError::Validation)?;
            SpeckMeasurer::new(MeasurementConfig {
                pre_filter,
                cleanup,
                ..Default::default()
            })
        })
        .collect::<SpeckResult<Vec<_>>>()?;

    let start_time = Instant::now();
    let mut best: Option<CalibrationOutcome> = None;
    let mut evaluated = 0;

    for measurer in &measurers {
        let pre_filter = &measurer.config().pre_filter;
        let rows = evaluate(samples, measurer);
        let errors: Vec<f64> = rows.iter().map(|r| r.error_pct).collect();
        evaluated += 1;

        let Some(error_std) = sample_std_dev(&errors) else {
            continue;
        };
        debug!(?pre_filter, error_std, "Calibration setting evaluated");

        let improved = match &best {
            Some(current) => error_std < current.error_std,
            None => true,
        };
        if improved {
            info!(?pre_filter, error_std, "New best calibration setting");
            best = Some(CalibrationOutcome {
                pre_filter: pre_filter.clone(),
                error_std,
                rows,
                evaluated: 0,
            });
        }
    }

    let mut outcome = best.ok_or_else(|| {
        SpeckError::Internal("No calibration setting could be scored".to_string())
    })?;
    outcome.evaluated = evaluated;

    info!(
        settings = evaluated,
        error_std = outcome.error_std,
        best = ?outcome.pre_filter,
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Calibration finished"
    );

    Ok(outcome)
}

/// Writes `image,hand_mm2,auto_mm2,error_pct` rows.
pub fn write_calibration_rows(path: &Path, rows: &[CalibrationRow]) -> SpeckResult<()> {
    let mut writer = csv::Writer::from_writer(create_report_file(path)?);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

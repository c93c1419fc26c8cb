//! # Crop and Mask Export
//!
//! Saves each measured ROI crop and a visual of its speck mask as PNG files
//! so that segmentations can be inspected by eye.

use image::{DynamicImage, GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{SpeckError, SpeckResult};
use crate::measurer::DetailedMeasurement;

const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OVERLAY_ALPHA: f32 = 0.5;

/// How the speck mask is rendered when exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskStyle {
    /// Crop pixels inside the speck, black elsewhere
    #[default]
    Masked,
    /// Crop with the speck tinted red
    Overlay,
    /// RGBA crop whose alpha channel is the mask
    Transparent,
}

impl MaskStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskStyle::Masked => "masked",
            MaskStyle::Overlay => "overlay",
            MaskStyle::Transparent => "transparent",
        }
    }
}

impl fmt::Display for MaskStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "masked" | "mask" => Ok(MaskStyle::Masked),
            "overlay" | "red" => Ok(MaskStyle::Overlay),
            "transparent" | "alpha" => Ok(MaskStyle::Transparent),
            other => Err(format!(
                "Unknown mask style '{}' (expected masked, overlay or transparent)",
                other
            )),
        }
    }
}

/// Renders `mask` over `crop` in the requested style.
///
/// `mask` must have the dimensions of `crop`; non-zero mask pixels are speck.
pub fn render_mask(crop: &RgbImage, mask: &GrayImage, style: MaskStyle) -> DynamicImage {
    let (width, height) = crop.dimensions();
    match style {
        MaskStyle::Masked => {
            let mut out = RgbImage::new(width, height);
            for (x, y, pixel) in crop.enumerate_pixels() {
                if mask.get_pixel(x, y)[0] > 0 {
                    out.put_pixel(x, y, *pixel);
                }
            }
            DynamicImage::ImageRgb8(out)
        }
        MaskStyle::Overlay => {
            let mut out = crop.clone();
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                if mask.get_pixel(x, y)[0] > 0 {
                    for c in 0..3 {
                        let blended = pixel[c] as f32 * (1.0 - OVERLAY_ALPHA)
                            + OVERLAY_COLOR[c] as f32 * OVERLAY_ALPHA;
                        pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
            DynamicImage::ImageRgb8(out)
        }
        MaskStyle::Transparent => {
            let mut out = RgbaImage::new(width, height);
            for (x, y, pixel) in crop.enumerate_pixels() {
                let alpha = mask.get_pixel(x, y)[0];
                out.put_pixel(x, y, Rgba([pixel[0], pixel[1], pixel[2], alpha]));
            }
            DynamicImage::ImageRgba8(out)
        }
    }
}

/// Files produced for one ROI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportedFiles {
    pub crop: Option<PathBuf>,
    pub mask: Option<PathBuf>,
}

/// Writes crops and mask visuals into configured directories
#[derive(Debug, Clone, Default)]
pub struct SpeckExporter {
    crop_dir: Option<PathBuf>,
    mask_dir: Option<PathBuf>,
    style: MaskStyle,
}

impl SpeckExporter {
    pub fn new(crop_dir: Option<PathBuf>, mask_dir: Option<PathBuf>, style: MaskStyle) -> Self {
        Self {
            crop_dir,
            mask_dir,
            style,
        }
    }

    /// True when neither crops nor masks are requested
    pub fn is_disabled(&self) -> bool {
        self.crop_dir.is_none() && self.mask_dir.is_none()
    }

    /// Saves the crop as `<stem>_<label>_<n>.png` and the mask visual as
    /// `<stem>_<label>_<n>_mask.png`.
    ///
    /// Zero-area ROIs have no pixels to save and are skipped.
    pub fn export(&self, detailed: &DetailedMeasurement) -> SpeckResult<ExportedFiles> {
        let mut files = ExportedFiles::default();
        if detailed.crop.width() == 0 || detailed.crop.height() == 0 {
            tracing::debug!(
                image = %detailed.measurement.image,
                label = %detailed.measurement.label,
                "Zero-area ROI, nothing to export"
            );
            return Ok(files);
        }

        let stem = detailed.measurement.crop_stem();

        if let Some(dir) = &self.crop_dir {
            let path = dir.join(format!("{}.png", stem));
            save_png(&DynamicImage::ImageRgb8(detailed.crop.clone()), &path)?;
            files.crop = Some(path);
        }

        if let Some(dir) = &self.mask_dir {
            let path = dir.join(format!("{}_mask.png", stem));
            let visual = render_mask(&detailed.crop, &detailed.segmentation.mask, self.style);
            save_png(&visual, &path)?;
            files.mask = Some(path);
        }

        Ok(files)
    }
}

fn save_png(image: &DynamicImage, path: &Path) -> SpeckResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SpeckError::FileSystem(format!(
                "Failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| SpeckError::FileSystem(format!("Failed to save '{}': {}", path.display(), e)))
}

//! # Speck Segmentation Module
//!
//! Isolates the dark speck inside an ROI crop. The pipeline is
//! intensity → optional pre-filter → Otsu inverted threshold → optional
//! morphological cleanup.
//!
//! The module is organized into focused sub-modules:
//! - `intensity`: BT.601 luma conversion
//! - `thresholding`: histogram and Otsu's method
//! - `filtering`: Gaussian and bilateral pre-filters, opening/closing
//! - `components`: largest connected component selection
//! - `types`: shared configuration and result types

pub mod components;
pub mod filtering;
pub mod intensity;
pub mod thresholding;
pub mod types;

use image::RgbImage;
use std::time::Instant;

pub use components::retain_largest_component;
pub use filtering::{apply_pre_filter, bilateral_filter, open_then_close};
pub use intensity::to_intensity;
pub use thresholding::{apply_inverted_threshold, find_otsu_threshold, intensity_histogram};
pub use types::{CleanupMode, PreFilter, SegmentationResult};

/// Structuring element radius for cleanup (5x5 square).
pub const CLEANUP_RADIUS: u8 = 2;

/// Segments the dark speck of a colour crop.
///
/// The returned mask has the crop's dimensions, with 255 on speck pixels and
/// 0 elsewhere. An empty crop yields an empty mask and a zero count.
pub fn segment_speck(
    crop: &RgbImage,
    pre_filter: &PreFilter,
    cleanup: CleanupMode,
) -> SegmentationResult {
    let start_time = Instant::now();

    if crop.width() == 0 || crop.height() == 0 {
        return SegmentationResult::empty(crop.width(), crop.height());
    }

    let gray = apply_pre_filter(&to_intensity(crop), pre_filter);
    let histogram = intensity_histogram(&gray);
    let threshold = find_otsu_threshold(&histogram);
    let mut mask = apply_inverted_threshold(&gray, threshold);

    if cleanup == CleanupMode::Morphological {
        mask = retain_largest_component(&open_then_close(&mask, CLEANUP_RADIUS));
    }

    let speck_pixels = mask.pixels().filter(|p| p[0] != 0).count() as u64;

    tracing::debug!(
        target: "speck_segmentation",
        "Segmented {}x{} crop in {}us: threshold={}, speck_pixels={}, cleanup={:?}",
        crop.width(),
        crop.height(),
        start_time.elapsed().as_micros(),
        threshold,
        speck_pixels,
        cleanup
    );

    SegmentationResult {
        mask,
        threshold,
        speck_pixels,
    }
}

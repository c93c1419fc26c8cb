//! # Image Filtering Module
//!
//! Pre-threshold smoothing (Gaussian and bilateral) and the morphological
//! cleanup of binary speck masks.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

use super::types::PreFilter;

/// Applies the configured pre-filter to an intensity crop.
pub fn apply_pre_filter(gray: &GrayImage, pre_filter: &PreFilter) -> GrayImage {
    match *pre_filter {
        PreFilter::None => gray.clone(),
        PreFilter::Gaussian { sigma } => imageproc::filter::gaussian_blur_f32(gray, sigma),
        PreFilter::Bilateral {
            diameter,
            sigma_color,
            sigma_space,
        } => bilateral_filter(gray, diameter, sigma_color, sigma_space),
    }
}

/// Edge-preserving bilateral filter.
///
/// Each output pixel is the weighted mean of the neighbours within a disc of
/// radius `diameter / 2`, weighted by spatial distance (`sigma_space`) and by
/// intensity difference (`sigma_color`). Edges are handled by replicating the
/// border pixels.
///
/// # Arguments
///
/// * `gray` - The input intensity image
/// * `diameter` - Neighbourhood diameter in pixels
/// * `sigma_color` - Larger values mix more dissimilar intensities
/// * `sigma_space` - Larger values let farther pixels contribute
pub fn bilateral_filter(
    gray: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (width, height) = gray.dimensions();
    let radius = (diameter / 2).max(1) as i64;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let color_weights: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    // (dx, dy, spatial weight) for every offset inside the disc
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() <= radius as f32 {
                offsets.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    let mut result = GrayImage::new(width, height);

    for (x, y, center) in gray.enumerate_pixels() {
        let center = center[0] as i32;
        let mut weighted_sum = 0f32;
        let mut weight_total = 0f32;

        for &(dx, dy, space_weight) in &offsets {
            let nx = (x as i64 + dx).clamp(0, max_x) as u32;
            let ny = (y as i64 + dy).clamp(0, max_y) as u32;
            let value = gray.get_pixel(nx, ny)[0] as i32;

            let weight = space_weight * color_weights[(value - center).unsigned_abs() as usize];
            weighted_sum += weight * value as f32;
            weight_total += weight;
        }

        let filtered = (weighted_sum / weight_total).round().clamp(0.0, 255.0) as u8;
        result.put_pixel(x, y, Luma([filtered]));
    }

    result
}

/// Morphological opening followed by closing with a square structuring
/// element of side `2 * radius + 1`.
///
/// Opening removes foreground blobs smaller than the element; closing then
/// fills holes and gaps of the same scale.
pub fn open_then_close(mask: &GrayImage, radius: u8) -> GrayImage {
    if mask.width() == 0 || mask.height() == 0 {
        return mask.clone();
    }

    let opened = open(mask, Norm::LInf, radius);
    close(&opened, Norm::LInf, radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_image() -> GrayImage {
        let mut img = GrayImage::new(20, 10);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            pixel[0] = if x < 10 { 30 } else { 210 };
        }
        img
    }

    #[test]
    fn test_pre_filter_none_is_identity() {
        let img = step_image();
        assert_eq!(apply_pre_filter(&img, &PreFilter::None), img);
    }

    #[test]
    fn test_bilateral_preserves_strong_edge() {
        let img = step_image();
        let filtered = bilateral_filter(&img, 5, 10.0, 5.0);

        // A 180-level step is far beyond sigma_color, so it survives
        assert!(filtered.get_pixel(9, 5)[0] < 40);
        assert!(filtered.get_pixel(10, 5)[0] > 200);
    }

    #[test]
    fn test_bilateral_smooths_small_noise() {
        let mut img = GrayImage::from_pixel(11, 11, Luma([100]));
        img.put_pixel(5, 5, Luma([110]));

        let filtered = bilateral_filter(&img, 5, 50.0, 5.0);
        assert!(filtered.get_pixel(5, 5)[0] < 110);
    }

    #[test]
    fn test_gaussian_pre_filter_keeps_dimensions() {
        let img = step_image();
        let blurred = apply_pre_filter(&img, &PreFilter::gaussian_5x5());
        assert_eq!(blurred.dimensions(), img.dimensions());
    }

    #[test]
    fn test_open_then_close_removes_specks_smaller_than_element() {
        let mut mask = GrayImage::new(30, 30);
        // 3x3 noise blob
        for y in 2..5 {
            for x in 2..5 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        // 10x10 speck
        for y in 15..25 {
            for x in 15..25 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let cleaned = open_then_close(&mask, 2);
        let count = cleaned.pixels().filter(|p| p[0] == 255).count();

        assert_eq!(count, 100);
        assert_eq!(cleaned.get_pixel(3, 3)[0], 0);
    }
}

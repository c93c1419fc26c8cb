//! # Image Thresholding Module
//!
//! Binary thresholding for speck isolation, with Otsu's method for automatic
//! threshold selection.

use image::{GrayImage, Luma};

/// Builds the 256-bin intensity histogram of a grayscale image.
pub fn intensity_histogram(gray: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    histogram
}

/// Finds the optimal threshold using Otsu's method by maximizing between-class variance.
///
/// This function implements Otsu's algorithm, which assumes the crop contains two classes
/// of pixels (speck and paper) and finds the threshold `t` that maximizes the variance
/// between the classes `{i <= t}` and `{i > t}`.
///
/// Every `t` in `0..=255` is considered and the first maximum wins. Splits that
/// leave one class empty are skipped, so a single-valued histogram returns `0`.
///
/// # Arguments
///
/// * `histogram` - The 256-bin histogram of pixel intensities
///
/// # Returns
///
/// Returns the optimal threshold value (0-255)
pub fn find_otsu_threshold(histogram: &[u64; 256]) -> u8 {
    let total_pixels: u64 = histogram.iter().sum();
    if total_pixels == 0 {
        return 0;
    }
    let total = total_pixels as f64;

    let total_weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut cumulative_count = 0u64;
    let mut cumulative_weighted_sum = 0f64;

    let mut max_variance = 0f64;
    let mut optimal_threshold = 0u8;

    for (threshold, &count) in histogram.iter().enumerate() {
        cumulative_count += count;
        cumulative_weighted_sum += threshold as f64 * count as f64;

        // one of the classes would be empty
        if cumulative_count == 0 || cumulative_count == total_pixels {
            continue;
        }

        // Weight of the dark class (pixels <= threshold)
        let w0 = cumulative_count as f64 / total;
        let w1 = 1.0 - w0;

        // Class means
        let mu0 = cumulative_weighted_sum / cumulative_count as f64;
        let mu1 = (total_weighted_sum - cumulative_weighted_sum)
            / (total_pixels - cumulative_count) as f64;

        // Between-class variance
        let variance = w0 * w1 * (mu0 - mu1).powi(2);

        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold as u8;
        }
    }

    optimal_threshold
}

/// Inverted binary threshold: 255 where intensity `<= threshold`, 0 elsewhere.
pub fn apply_inverted_threshold(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut binary_img = GrayImage::new(gray.width(), gray.height());

    for (x, y, pixel) in gray.enumerate_pixels() {
        let binary_value = if pixel[0] <= threshold { 255u8 } else { 0u8 };
        binary_img.put_pixel(x, y, Luma([binary_value]));
    }

    binary_img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_otsu_threshold_basic() {
        // Two distinct classes
        let mut histogram = [0u64; 256];
        histogram[25] = 5000;
        histogram[225] = 5000;

        let threshold = find_otsu_threshold(&histogram);

        // Dark class included, light class excluded
        assert!((25..225).contains(&threshold));
    }

    #[test]
    fn test_find_otsu_threshold_prefers_lowest_split() {
        let mut histogram = [0u64; 256];
        histogram[40] = 10;
        histogram[200] = 30;

        assert_eq!(find_otsu_threshold(&histogram), 40);
    }

    #[test]
    fn test_find_otsu_threshold_single_value() {
        let mut histogram = [0u64; 256];
        histogram[128] = 100;

        assert_eq!(find_otsu_threshold(&histogram), 0);
    }

    #[test]
    fn test_find_otsu_threshold_empty_histogram() {
        assert_eq!(find_otsu_threshold(&[0u64; 256]), 0);
    }

    #[test]
    fn test_find_otsu_threshold_unbalanced_classes() {
        // Small dark speck on bright paper, with some spread in both classes
        let mut histogram = [0u64; 256];
        for histogram_val in histogram.iter_mut().take(40).skip(20) {
            *histogram_val = 5;
        }
        for histogram_val in histogram.iter_mut().take(220).skip(180) {
            *histogram_val = 200;
        }

        let threshold = find_otsu_threshold(&histogram);
        assert!((39..180).contains(&threshold));
    }

    #[test]
    fn test_apply_inverted_threshold() {
        let mut img = GrayImage::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                let value = if x < 5 { 25 } else { 225 };
                img.put_pixel(x, y, Luma([value]));
            }
        }

        let threshold = find_otsu_threshold(&intensity_histogram(&img));
        let binary_img = apply_inverted_threshold(&img, threshold);

        for (x, _, pixel) in binary_img.enumerate_pixels() {
            assert!(pixel[0] == 0 || pixel[0] == 255);
            assert_eq!(pixel[0] == 255, x < 5);
        }
    }

    #[test]
    fn test_uniform_image_is_all_or_nothing() {
        for value in [0u8, 128, 255] {
            let img = GrayImage::from_pixel(8, 8, Luma([value]));
            let threshold = find_otsu_threshold(&intensity_histogram(&img));
            let dark = apply_inverted_threshold(&img, threshold)
                .pixels()
                .filter(|p| p[0] == 255)
                .count();

            assert!(dark == 0 || dark == 64, "value {} gave {} dark pixels", value, dark);
        }
    }
}

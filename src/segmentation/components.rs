//! Connected component selection on binary masks.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Keeps only the largest 4-connected foreground component of `mask`.
///
/// Foreground is any non-zero pixel; the output uses 255 for the retained
/// component. Ties go to the component met first in raster order. A mask
/// without foreground is returned unchanged.
pub fn retain_largest_component(mask: &GrayImage) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Four, Luma([0u8]));

    let mut areas: Vec<u64> = Vec::new();
    for label in labels.pixels() {
        let id = label[0] as usize;
        if id == 0 {
            continue;
        }
        if areas.len() < id {
            areas.resize(id, 0);
        }
        areas[id - 1] += 1;
    }

    let Some(largest) = largest_label(&areas) else {
        return mask.clone();
    };

    let mut result = GrayImage::new(mask.width(), mask.height());
    for (x, y, label) in labels.enumerate_pixels() {
        if label[0] == largest {
            result.put_pixel(x, y, Luma([255]));
        }
    }
    result
}

/// 1-based label of the first maximum in `areas`.
fn largest_label(areas: &[u64]) -> Option<u32> {
    let mut best: Option<(usize, u64)> = None;
    for (index, &area) in areas.iter().enumerate() {
        let better = match best {
            Some((_, best_area)) => area > best_area,
            None => area > 0,
        };
        if better {
            best = Some((index, area));
        }
    }
    best.map(|(index, _)| index as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut GrayImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) {
        for y in ys {
            for x in xs.clone() {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn test_keeps_largest_blob() {
        let mut mask = GrayImage::new(20, 20);
        fill(&mut mask, 0..3, 0..3);
        fill(&mut mask, 10..16, 10..16);
        fill(&mut mask, 0..2, 18..20);

        let result = retain_largest_component(&mask);
        let count = result.pixels().filter(|p| p[0] == 255).count();

        assert_eq!(count, 36);
        assert_eq!(result.get_pixel(1, 1)[0], 0);
        assert_eq!(result.get_pixel(12, 12)[0], 255);
    }

    #[test]
    fn test_diagonal_neighbours_are_separate_components() {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(0, 0, Luma([255]));
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 1, Luma([255]));

        let result = retain_largest_component(&mask);

        assert_eq!(result.get_pixel(0, 0)[0], 0);
        assert_eq!(result.get_pixel(1, 1)[0], 255);
        assert_eq!(result.get_pixel(2, 1)[0], 255);
    }

    #[test]
    fn test_empty_mask_unchanged() {
        let mask = GrayImage::new(5, 5);
        assert_eq!(retain_largest_component(&mask), mask);
    }

    #[test]
    fn test_largest_label_ties_pick_first() {
        assert_eq!(largest_label(&[4, 9, 9, 2]), Some(2));
        assert_eq!(largest_label(&[]), None);
    }
}

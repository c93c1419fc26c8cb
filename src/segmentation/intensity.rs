//! Colour to single-channel intensity conversion.

use image::{GrayImage, Luma, RgbImage};

// BT.601 weights in 14-bit fixed point (0.299, 0.587, 0.114).
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Converts an RGB crop to luma with BT.601 weights, rounding to nearest.
///
/// `image`'s own `to_luma8` uses Rec. 709 weights and gives different values.
pub fn to_intensity(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        gray.put_pixel(x, y, Luma([luma(pixel[0], pixel[1], pixel[2])]));
    }

    gray
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT;
    ((weighted + (1 << (SHIFT - 1))) >> SHIFT) as u8
}

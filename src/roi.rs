//! Rectangular regions of interest in sheet pixel space.

use serde::{Deserialize, Serialize};

/// A labelled rectangle, as annotated. Corners may be in any order and may
/// lie outside the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub label: String,
    pub corner1: (f64, f64),
    pub corner2: (f64, f64),
}

impl Roi {
    pub fn new(label: impl Into<String>, corner1: (f64, f64), corner2: (f64, f64)) -> Self {
        Self {
            label: label.into(),
            corner1,
            corner2,
        }
    }

    /// Area of the rectangle as drawn, before truncation and clamping.
    pub fn drawn_area(&self) -> f64 {
        (self.corner2.0 - self.corner1.0).abs() * (self.corner2.1 - self.corner1.1).abs()
    }

    /// Truncates the corners to integer pixels, orders them and clamps them
    /// to a `width` x `height` image. The result may be empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelRect {
        let (x1, x2) = ordered(self.corner1.0 as i64, self.corner2.0 as i64);
        let (y1, y2) = ordered(self.corner1.1 as i64, self.corner2.1 as i64);

        let clamp_x = |v: i64| v.clamp(0, width as i64) as u32;
        let clamp_y = |v: i64| v.clamp(0, height as i64) as u32;

        PixelRect {
            x1: clamp_x(x1),
            y1: clamp_y(y1),
            x2: clamp_x(x2),
            y2: clamp_y(y2),
        }
    }
}

fn ordered(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Half-open pixel rectangle `[x1, x2) x [y1, y2)` with `x1 <= x2`, `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_rect_is_unchanged() {
        let roi = Roi::new("S1", (10.0, 20.0), (60.0, 45.0));
        let rect = roi.clamp_to(100, 100);

        assert_eq!(rect, PixelRect { x1: 10, y1: 20, x2: 60, y2: 45 });
        assert_eq!(rect.area(), 50 * 25);
    }

    #[test]
    fn test_reversed_corners_are_normalized() {
        let roi = Roi::new("r2", (60.9, 45.2), (10.4, 20.7));
        let rect = roi.clamp_to(100, 100);

        assert_eq!(rect, PixelRect { x1: 10, y1: 20, x2: 60, y2: 45 });
    }

    #[test]
    fn test_partially_outside_is_clamped() {
        let roi = Roi::new("p3", (-15.0, 80.0), (30.0, 140.0));
        let rect = roi.clamp_to(100, 100);

        assert_eq!(rect, PixelRect { x1: 0, y1: 80, x2: 30, y2: 100 });
    }

    #[test]
    fn test_fully_outside_is_empty() {
        let left = Roi::new("S", (-50.0, 10.0), (-10.0, 20.0)).clamp_to(100, 100);
        let right = Roi::new("S", (150.0, 10.0), (200.0, 20.0)).clamp_to(100, 100);

        assert!(left.is_empty());
        assert!(right.is_empty());
        assert_eq!(left.area(), 0);
        assert_eq!(right.area(), 0);
    }

    #[test]
    fn test_origin_corners_are_degenerate() {
        let rect = Roi::new("S0", (0.0, 0.0), (0.0, 0.0)).clamp_to(100, 100);
        assert!(rect.is_empty());
        assert_eq!(rect.area(), 0);
    }

    #[test]
    fn test_drawn_area_uses_raw_corners() {
        let roi = Roi::new("rect", (10.5, 2.0), (0.5, 6.0));
        assert!((roi.drawn_area() - 40.0).abs() < 1e-9);
    }
}

//! # Sheet Calibration
//!
//! A sheet is the photographed circular handsheet. Its real diameter is known,
//! which gives the mm² per px² factor used to convert every pixel count
//! measured on that photograph.
//!
//! How many pixels the sheet covers is a convention, not a measurement.
//! [`PixelAreaConvention`] names the supported ones; reports produced under
//! different conventions are not comparable.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::errors::{SpeckError, SpeckResult};

/// Default real diameter of a handsheet in millimeters.
pub const DEFAULT_SHEET_DIAMETER_MM: f64 = 164.4;

/// How the pixel area of the sheet is derived from the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelAreaConvention {
    /// The whole image counts as sheet: `width * height`
    #[default]
    RawRectangle,
    /// A circle whose diameter is the mean of width and height
    CircleFromAverage,
    /// A circle inscribed in the image: diameter is `min(width, height)`
    CircleFromMin,
}

impl PixelAreaConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelAreaConvention::RawRectangle => "raw",
            PixelAreaConvention::CircleFromAverage => "circle-average",
            PixelAreaConvention::CircleFromMin => "circle-min",
        }
    }

    /// Pixel area of a sheet photographed at `width` x `height`.
    pub fn sheet_pixel_area(&self, width: u32, height: u32) -> f64 {
        let (w, h) = (width as f64, height as f64);
        match self {
            PixelAreaConvention::RawRectangle => w * h,
            PixelAreaConvention::CircleFromAverage => circle_area((w + h) / 2.0),
            PixelAreaConvention::CircleFromMin => circle_area(w.min(h)),
        }
    }
}

impl fmt::Display for PixelAreaConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelAreaConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" | "raw-rectangle" | "rectangle" => Ok(PixelAreaConvention::RawRectangle),
            "circle-average" | "average" | "avg" => Ok(PixelAreaConvention::CircleFromAverage),
            "circle-min" | "min" => Ok(PixelAreaConvention::CircleFromMin),
            other => Err(format!(
                "unknown pixel area convention '{}' (expected raw, circle-average or circle-min)",
                other
            )),
        }
    }
}

/// Area of a circle of the given diameter.
pub fn circle_area(diameter: f64) -> f64 {
    PI * (diameter / 2.0).powi(2)
}

/// Calibration of one photographed sheet. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    width: u32,
    height: u32,
    diameter_mm: f64,
    convention: PixelAreaConvention,
    pixel_area: f64,
    physical_area_mm2: f64,
}

impl Sheet {
    /// Builds the calibration for an image of `width` x `height` pixels.
    ///
    /// # Errors
    ///
    /// Returns `SpeckError::Config` when the diameter is not a positive finite
    /// number and `SpeckError::Validation` when either dimension is zero.
    pub fn new(
        width: u32,
        height: u32,
        diameter_mm: f64,
        convention: PixelAreaConvention,
    ) -> SpeckResult<Self> {
        if !diameter_mm.is_finite() || diameter_mm <= 0.0 {
            return Err(SpeckError::Config(format!(
                "Sheet diameter must be a positive number of millimeters, got {}",
                diameter_mm
            )));
        }
        if width == 0 || height == 0 {
            return Err(SpeckError::Validation(format!(
                "Sheet image must have non-zero dimensions, got {}x{}",
                width, height
            )));
        }

        Ok(Self {
            width,
            height,
            diameter_mm,
            convention,
            pixel_area: convention.sheet_pixel_area(width, height),
            physical_area_mm2: circle_area(diameter_mm),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn diameter_mm(&self) -> f64 {
        self.diameter_mm
    }

    pub fn convention(&self) -> PixelAreaConvention {
        self.convention
    }

    /// Sheet area in px² under the selected convention.
    pub fn pixel_area(&self) -> f64 {
        self.pixel_area
    }

    /// Real sheet area, π·(d/2)².
    pub fn physical_area_mm2(&self) -> f64 {
        self.physical_area_mm2
    }

    /// Conversion factor from px² to mm².
    pub fn scale_mm2_per_px2(&self) -> f64 {
        self.physical_area_mm2 / self.pixel_area
    }
}

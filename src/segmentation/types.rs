//! # Shared Types for Speck Segmentation
//!
//! Configuration enums and the result type used across the segmentation
//! sub-modules.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Post-threshold mask cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupMode {
    /// Count every pixel of the raw Otsu mask
    #[default]
    None,
    /// 5x5 opening then closing, then keep the largest 4-connected component
    Morphological,
}

impl CleanupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupMode::None => "none",
            CleanupMode::Morphological => "morphological",
        }
    }
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" | "raw" => Ok(CleanupMode::None),
            "morphological" | "morph" | "clean" => Ok(CleanupMode::Morphological),
            other => Err(format!(
                "unknown cleanup mode '{}' (expected none or morphological)",
                other
            )),
        }
    }
}

/// Smoothing applied to the intensity crop before thresholding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum PreFilter {
    #[default]
    None,
    /// Gaussian blur with the given standard deviation
    Gaussian { sigma: f32 },
    /// Edge-preserving bilateral filter over a `diameter`-pixel neighbourhood
    Bilateral {
        diameter: u32,
        sigma_color: f32,
        sigma_space: f32,
    },
}

impl PreFilter {
    /// Gaussian matching a 5x5 kernel with automatic sigma.
    pub fn gaussian_5x5() -> Self {
        PreFilter::Gaussian { sigma: 1.1 }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PreFilter::None => Ok(()),
            PreFilter::Gaussian { sigma } => {
                if sigma.is_finite() && sigma > 0.0 {
                    Ok(())
                } else {
                    Err(format!("Gaussian sigma must be > 0, got {}", sigma))
                }
            }
            PreFilter::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => {
                if diameter == 0 {
                    return Err("Bilateral diameter must be > 0".to_string());
                }
                if !(sigma_color > 0.0 && sigma_space > 0.0) {
                    return Err(format!(
                        "Bilateral sigmas must be > 0, got color={} space={}",
                        sigma_color, sigma_space
                    ));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreFilter::None => write!(f, "none"),
            PreFilter::Gaussian { sigma } => write!(f, "gaussian:{}", sigma),
            PreFilter::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => write!(f, "bilateral:{},{},{}", diameter, sigma_color, sigma_space),
        }
    }
}

/// Parses `none`, `gaussian`, `gaussian:SIGMA` or `bilateral:D,SIGMA_COLOR,SIGMA_SPACE`.
impl FromStr for PreFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        let (kind, params) = match value.split_once(':') {
            Some((kind, params)) => (kind, Some(params)),
            None => (value.as_str(), None),
        };

        let filter = match (kind, params) {
            ("none", None) => PreFilter::None,
            ("gaussian", None) => PreFilter::gaussian_5x5(),
            ("gaussian", Some(sigma)) => PreFilter::Gaussian {
                sigma: sigma
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid Gaussian sigma '{}'", sigma))?,
            },
            ("bilateral", Some(params)) => {
                let parts: Vec<&str> = params.split(',').map(str::trim).collect();
                let [diameter, sigma_color, sigma_space] = parts.as_slice() else {
                    return Err(format!(
                        "bilateral filter needs D,SIGMA_COLOR,SIGMA_SPACE, got '{}'",
                        params
                    ));
                };
                PreFilter::Bilateral {
                    diameter: diameter
                        .parse()
                        .map_err(|_| format!("invalid bilateral diameter '{}'", diameter))?,
                    sigma_color: sigma_color
                        .parse()
                        .map_err(|_| format!("invalid bilateral sigma_color '{}'", sigma_color))?,
                    sigma_space: sigma_space
                        .parse()
                        .map_err(|_| format!("invalid bilateral sigma_space '{}'", sigma_space))?,
                }
            }
            _ => {
                return Err(format!(
                    "unknown pre-filter '{}' (expected none, gaussian[:SIGMA] or bilateral:D,SC,SS)",
                    s
                ))
            }
        };

        filter.validate()?;
        Ok(filter)
    }
}

/// Result of segmenting one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResult {
    /// Binary mask, 255 = speck
    pub mask: GrayImage,
    /// Otsu threshold; pixels at or below it are speck
    pub threshold: u8,
    /// Number of speck pixels in `mask`
    pub speck_pixels: u64,
}

impl SegmentationResult {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            mask: GrayImage::new(width, height),
            threshold: 0,
            speck_pixels: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_mode_parsing() {
        assert_eq!("morphological".parse(), Ok(CleanupMode::Morphological));
        assert_eq!(" None ".parse(), Ok(CleanupMode::None));
        assert!("median".parse::<CleanupMode>().is_err());
    }

    #[test]
    fn test_pre_filter_validation() {
        assert!(PreFilter::None.validate().is_ok());
        assert!(PreFilter::gaussian_5x5().validate().is_ok());
        assert!(PreFilter::Gaussian { sigma: 0.0 }.validate().is_err());
        assert!(PreFilter::Bilateral {
            diameter: 0,
            sigma_color: 10.0,
            sigma_space: 10.0
        }
        .validate()
        .is_err());
        assert!(PreFilter::Bilateral {
            diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_pre_filter_parsing() {
        assert_eq!("none".parse(), Ok(PreFilter::None));
        assert_eq!("Gaussian".parse(), Ok(PreFilter::gaussian_5x5()));
        assert_eq!("gaussian:2.5".parse(), Ok(PreFilter::Gaussian { sigma: 2.5 }));
        assert_eq!(
            "bilateral:9, 75, 75".parse(),
            Ok(PreFilter::Bilateral {
                diameter: 9,
                sigma_color: 75.0,
                sigma_space: 75.0
            })
        );
        assert!("bilateral:9,75".parse::<PreFilter>().is_err());
        assert!("gaussian:0".parse::<PreFilter>().is_err());
        assert!("median:3".parse::<PreFilter>().is_err());
    }

    #[test]
    fn test_pre_filter_display_parses_back() {
        let filter = PreFilter::Bilateral {
            diameter: 15,
            sigma_color: 20.0,
            sigma_space: 5.0,
        };
        assert_eq!(filter.to_string().parse(), Ok(filter));
    }
}

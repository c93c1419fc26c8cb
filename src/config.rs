//! # Unified Application Configuration
//!
//! This module gathers the constants that the measurement workflow depends on
//! (sheet diameter, pixel-area convention, cleanup mode, marker allow-list) into
//! explicit configuration values. Settings are loaded from `SPECK_*` environment
//! variables (a `.env` file is honoured by the binaries), validated, and can be
//! overridden from the command line.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::annotation::{MarkerFilter, DEFAULT_MARKERS};
use crate::discovery::PairingStrategy;
use crate::errors::{SpeckError, SpeckResult};
use crate::observability_config::ObservabilityConfig;
use crate::segmentation::{CleanupMode, PreFilter};
use crate::sheet::{PixelAreaConvention, Sheet, DEFAULT_SHEET_DIAMETER_MM};

/// Default number of decimals for mm² values in reports.
pub const DEFAULT_REPORT_DECIMALS: u32 = 2;

/// Settings that determine the numbers produced by the measurer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Real handsheet diameter in millimeters
    pub diameter_mm: f64,
    /// How the sheet's pixel area is derived from the image size
    pub convention: PixelAreaConvention,
    /// Mask cleanup after thresholding
    pub cleanup: CleanupMode,
    /// Smoothing before thresholding
    pub pre_filter: PreFilter,
    /// First characters of labels that are speck ROIs
    pub markers: Vec<char>,
    /// Decimals kept for mm² values
    pub decimals: u32,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            diameter_mm: DEFAULT_SHEET_DIAMETER_MM,
            convention: PixelAreaConvention::default(),
            cleanup: CleanupMode::default(),
            pre_filter: PreFilter::default(),
            markers: DEFAULT_MARKERS.to_vec(),
            decimals: DEFAULT_REPORT_DECIMALS,
        }
    }
}

impl MeasurementConfig {
    /// Validate measurement configuration
    pub fn validate(&self) -> SpeckResult<()> {
        if !self.diameter_mm.is_finite() || self.diameter_mm <= 0.0 {
            return Err(SpeckError::Config(format!(
                "Sheet diameter must be a positive number of millimeters, got {}",
                self.diameter_mm
            )));
        }

        if self.markers.is_empty() {
            return Err(SpeckError::Config(
                "At least one ROI label marker is required".to_string(),
            ));
        }

        if self.decimals > 10 {
            return Err(SpeckError::Config(format!(
                "Report decimals cannot be greater than 10, got {}",
                self.decimals
            )));
        }

        self.pre_filter.validate().map_err(SpeckError::Config)?;

        Ok(())
    }

    pub fn marker_filter(&self) -> MarkerFilter {
        MarkerFilter::new(self.markers.iter().copied())
    }

    /// Calibration of a sheet photographed at `width` x `height`.
    pub fn sheet(&self, width: u32, height: u32) -> SpeckResult<Sheet> {
        Sheet::new(width, height, self.diameter_mm, self.convention)
    }
}

/// Settings for walking a folder of sheets
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Dispatch sheets on the rayon thread pool
    pub parallel: bool,
    /// How sheet images are matched with annotation files
    pub pairing: PairingStrategy,
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Measurement configuration
    pub measurement: MeasurementConfig,
    /// Batch configuration
    pub batch: BatchConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> SpeckResult<Self> {
        let mut config = Self::default();

        if let Some(diameter) = env_parse::<f64>("SPECK_DIAMETER_MM")? {
            config.measurement.diameter_mm = diameter;
        }
        if let Some(convention) = env_parse::<PixelAreaConvention>("SPECK_AREA_CONVENTION")? {
            config.measurement.convention = convention;
        }
        if let Some(cleanup) = env_parse::<CleanupMode>("SPECK_CLEANUP")? {
            config.measurement.cleanup = cleanup;
        }
        if let Some(pre_filter) = env_parse::<PreFilter>("SPECK_PRE_FILTER")? {
            config.measurement.pre_filter = pre_filter;
        }
        if let Ok(markers) = env::var("SPECK_MARKERS") {
            config.measurement.markers = parse_markers(&markers);
        }
        if let Some(decimals) = env_parse::<u32>("SPECK_DECIMALS")? {
            config.measurement.decimals = decimals;
        }
        if let Some(parallel) = env_parse::<bool>("SPECK_PARALLEL")? {
            config.batch.parallel = parallel;
        }
        if let Some(pairing) = env_parse::<PairingStrategy>("SPECK_PAIRING")? {
            config.batch.pairing = pairing;
        }

        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> SpeckResult<()> {
        self.measurement.validate()?;
        self.batch.pairing.validate().map_err(SpeckError::Config)?;
        self.observability.validate().map_err(SpeckError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: diameter_mm={}, convention={}, cleanup={}, pre_filter={}, markers={}, pairing={}, parallel={}",
            self.measurement.diameter_mm,
            self.measurement.convention,
            self.measurement.cleanup,
            self.measurement.pre_filter,
            self.measurement.markers.iter().collect::<String>(),
            self.batch.pairing,
            self.batch.parallel
        )
    }
}

/// Splits a marker list such as `"Spr"` or `"S,p,r,1"` into characters.
pub fn parse_markers(value: &str) -> Vec<char> {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect()
}

fn env_parse<T>(key: &str) -> SpeckResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| {
                SpeckError::Config(format!("{} has an invalid value '{}': {}", key, raw, e))
            }),
        Err(_) => Ok(None),
    }
}

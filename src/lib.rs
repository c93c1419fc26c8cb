//! # speck-meter
//!
//! Measures dark specks on photographed paper handsheets. Each sheet comes
//! with a LabelMe annotation of rectangular ROIs; every ROI is thresholded
//! with Otsu's method and its dark area reported in pixels and mm².

pub mod aggregate;
pub mod annotation;
pub mod batch;
pub mod calibration;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod export;
pub mod measurer;
pub mod observability;
pub mod observability_config;
pub mod overlay;
pub mod rect_report;
pub mod report;
pub mod roi;
pub mod sampling;
pub mod segmentation;
pub mod sheet;
pub mod synthetic;

// Re-export types for easier access
pub use config::{AppConfig, MeasurementConfig};
pub use errors::{SpeckError, SpeckResult};
pub use measurer::{SpeckMeasurement, SpeckMeasurer};
pub use roi::{PixelRect, Roi};
pub use sheet::{PixelAreaConvention, Sheet};

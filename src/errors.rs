//! # Application Error Types
//!
//! This module defines the error type shared by every speck-meter component.
//! Failures are scoped to a single sheet: callers log them and move on to the
//! next sheet, so nothing here is fatal to a batch run.

use std::fmt;

/// General error type for measurement, discovery and reporting operations
#[derive(Debug, Clone, PartialEq)]
pub enum SpeckError {
    /// Sheet image is missing, unreadable or cannot be decoded
    ImageDecode(String),
    /// Annotation file is missing, malformed or lacks a `shapes` list
    AnnotationParse(String),
    /// Configuration validation errors
    Config(String),
    /// Input validation errors (sample sizes, mismatched dimensions, ...)
    Validation(String),
    /// File system errors
    FileSystem(String),
    /// CSV report read/write errors
    Report(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for SpeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeckError::ImageDecode(msg) => write!(f, "[IMAGE_DECODE] {}", msg),
            SpeckError::AnnotationParse(msg) => write!(f, "[ANNOTATION] {}", msg),
            SpeckError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            SpeckError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            SpeckError::FileSystem(msg) => write!(f, "[FILESYSTEM] {}", msg),
            SpeckError::Report(msg) => write!(f, "[REPORT] {}", msg),
            SpeckError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for SpeckError {}

impl SpeckError {
    /// Short machine-friendly name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            SpeckError::ImageDecode(_) => "image_decode",
            SpeckError::AnnotationParse(_) => "annotation_parse",
            SpeckError::Config(_) => "config",
            SpeckError::Validation(_) => "validation",
            SpeckError::FileSystem(_) => "filesystem",
            SpeckError::Report(_) => "report",
            SpeckError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for SpeckError {
    fn from(err: anyhow::Error) -> Self {
        SpeckError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for SpeckError {
    fn from(err: std::io::Error) -> Self {
        SpeckError::FileSystem(err.to_string())
    }
}

impl From<csv::Error> for SpeckError {
    fn from(err: csv::Error) -> Self {
        SpeckError::Report(err.to_string())
    }
}

impl From<serde_json::Error> for SpeckError {
    fn from(err: serde_json::Error) -> Self {
        SpeckError::AnnotationParse(err.to_string())
    }
}

impl From<image::ImageError> for SpeckError {
    fn from(err: image::ImageError) -> Self {
        SpeckError::ImageDecode(err.to_string())
    }
}

/// Result type alias for convenience
pub type SpeckResult<T> = Result<T, SpeckError>;

/// Standardized error logging utilities for consistent error reporting
pub mod error_logging {
    use tracing::error;

    /// Log a sheet that was skipped because of a per-sheet failure
    pub fn log_sheet_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image: &str,
        annotation: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image = %image,
            annotation = ?annotation,
            "Sheet processing failed, skipping"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_filesystem_error(
        error: &impl std::fmt::Display,
        operation: &str,
        path: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            path = ?path,
            "File system operation failed"
        );
    }

    /// Log report serialization errors
    pub fn log_report_error(error: &impl std::fmt::Display, operation: &str, path: &str) {
        error!(
            error = %error,
            operation = %operation,
            path = %path,
            "Report operation failed"
        );
    }

    /// Log configuration errors during startup
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}

//! # Observability Configuration
//!
//! Environment-specific configuration for logging and metrics output.

use std::env;
use std::path::PathBuf;

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, production)
    pub environment: String,
    /// Log level for speck-meter components
    pub log_level: String,
    /// Log output format: `pretty` or `json`
    pub log_format: String,
    /// Where to write the Prometheus text exposition at exit, if anywhere
    pub metrics_file: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_file: None,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let default_format = if environment == "development" {
            "pretty"
        } else {
            "json"
        };

        Self {
            log_level: env::var("SPECK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| default_format.to_string()),
            metrics_file: env::var("SPECK_METRICS_FILE")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            environment,
        }
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Whether log lines should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!("Invalid log level: {}", self.log_level));
        }

        let format = self.log_format.to_lowercase();
        if format != "pretty" && format != "json" {
            return Err(format!(
                "Invalid log format: {} (expected pretty or json)",
                self.log_format
            ));
        }

        Ok(())
    }
}

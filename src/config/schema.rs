//! Configuration schema types
//!
//! This module defines the configuration structure for Veil. The
//! `[anonymization]` section is owned by
//! [`crate::anonymization::config`]; everything else lives here.

use crate::anonymization::config::AnonymizationConfig;
use crate::domain::RecordFormat;
use serde::{Deserialize, Serialize};

/// Main Veil configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VeilConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Pipeline settings
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Rules, parameters and shared settings
    #[serde(default)]
    pub anonymization: AnonymizationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VeilConfig {
    /// Validates the configuration
    ///
    /// Rule-level problems are reported later by the rule compiler, which
    /// collects every violation at once.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.processing.validate()?;
        self.anonymization.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Partitioned pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Items read per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum batches in flight
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,

    /// Deliver batches to the sink in source order
    #[serde(default = "default_true")]
    pub keep_order: bool,

    /// Log and exclude failed records instead of aborting the run
    #[serde(default = "default_true")]
    pub skip_failed_item: bool,

    /// Input record format
    #[serde(default)]
    pub format: RecordFormat,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            partition_count: default_partition_count(),
            keep_order: true,
            skip_failed_item: true,
            format: RecordFormat::default(),
        }
    }
}

impl ProcessingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 || self.batch_size > 100_000 {
            return Err(format!(
                "processing.batch_size must be between 1 and 100000, got {}",
                self.batch_size
            ));
        }
        if self.partition_count == 0 || self.partition_count > 256 {
            return Err(format!(
                "processing.partition_count must be between 1 and 256, got {}",
                self.partition_count
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Log file name prefix
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path must not be empty when local_enabled".to_string());
        }

        if self.file_name.trim().is_empty() || self.file_name.contains('/') {
            return Err(format!(
                "logging.file_name '{}' must be a plain file name",
                self.file_name
            ));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            file_name: default_file_name(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_partition_count() -> usize {
    4
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_file_name() -> String {
    "veil.log".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log_level 'verbose'"));
    }

    #[test]
    fn test_processing_config_validation() {
        let mut config = ProcessingConfig::default();
        assert!(config.validate().is_ok());

        config.batch_size = 0;
        assert!(config.validate().is_err());

        config.batch_size = 10;
        config.partition_count = 0;
        assert!(config.validate().unwrap_err().contains("partition_count"));
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(config.local_enabled);
        assert_eq!(config.local_path, "./logs");
        assert_eq!(config.local_rotation, "daily");
        assert_eq!(config.file_name, "veil.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_config_rejects_size_rotation() {
        let config = LoggingConfig {
            local_rotation: "size".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("local_rotation"));
    }

    #[test]
    fn test_default_values() {
        let config: VeilConfig = toml::from_str("").unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.processing.batch_size, 1000);
        assert_eq!(config.processing.partition_count, 4);
        assert!(config.processing.keep_order);
        assert!(config.processing.skip_failed_item);
        assert_eq!(config.processing.format, RecordFormat::Fhir);
        assert!(config.anonymization.rules.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_processing_format_parses_lowercase() {
        let config: VeilConfig = toml::from_str(
            r#"
            [processing]
            format = "dicom"
            keep_order = false
            "#,
        )
        .unwrap();
        assert_eq!(config.processing.format, RecordFormat::Dicom);
        assert!(!config.processing.keep_order);
    }
}

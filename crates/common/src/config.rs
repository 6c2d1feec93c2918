//! Configuration for the recovery middleware.
//!
//! Nothing here reads the environment or discovers files: the host service
//! owns its configuration and hands the relevant section over, either as a
//! deserialized struct or as a TOML string.
//!
//! ## Example Configuration
//!
//! ```toml
//! attach_details = true
//! forward_to_previous_hook = false
//!
//! [telemetry]
//! service_name = "orders-api"
//! json_logging = true
//! log_level = "info"
//! log_file = "/var/log/orders-api/panics.log"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service name used when the host does not supply one
pub const DEFAULT_SERVICE_NAME: &str = "panic-recovery";

/// Main recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Logging sink settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Attach the diagnostic record to the outgoing response or status
    #[serde(default = "default_attach_details")]
    pub attach_details: bool,

    /// Let the previously installed panic hook run for panics inside a
    /// recovery region (prints the default "thread panicked" message).
    /// Process-wide: the first layer built from a configuration applies it.
    #[serde(default)]
    pub forward_to_previous_hook: bool,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name recorded on every entry
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Log filter directive (trace, debug, info, warn, error, or target=level lists)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append entries to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

// Default value functions
fn default_attach_details() -> bool {
    true
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_json_logging() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            attach_details: default_attach_details(),
            forward_to_previous_hook: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: default_json_logging(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl RecoveryConfig {
    /// Load configuration from a TOML document supplied by the host.
    ///
    /// Missing keys take their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use panic_recovery_common::config::RecoveryConfig;
    ///
    /// let config = RecoveryConfig::from_toml_str("attach_details = false").unwrap();
    /// assert!(!config.attach_details);
    /// assert_eq!(config.telemetry.log_level, "info");
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .context("Failed to build recovery configuration")?;

        let recovery_config: RecoveryConfig = config
            .try_deserialize()
            .context("Failed to deserialize recovery configuration")?;

        recovery_config.validate()?;

        Ok(recovery_config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.telemetry.service_name.trim().is_empty() {
            anyhow::bail!("Telemetry service name must not be empty");
        }

        if self.telemetry.log_level.trim().is_empty() {
            anyhow::bail!("Telemetry log level must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecoveryConfig::default();
        assert!(config.attach_details);
        assert!(!config.forward_to_previous_hook);
        assert!(config.telemetry.json_logging);
        assert_eq!(config.telemetry.service_name, "panic-recovery");
        assert!(config.telemetry.log_file.is_none());
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = RecoveryConfig::from_toml_str("").unwrap();
        assert!(config.attach_details);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_full_document() {
        let config = RecoveryConfig::from_toml_str(
            r#"
            attach_details = false
            forward_to_previous_hook = true

            [telemetry]
            service_name = "orders-api"
            json_logging = false
            log_level = "warn"
            log_file = "/tmp/panics.log"
            "#,
        )
        .unwrap();

        assert!(!config.attach_details);
        assert!(config.forward_to_previous_hook);
        assert_eq!(config.telemetry.service_name, "orders-api");
        assert!(!config.telemetry.json_logging);
        assert_eq!(config.telemetry.log_level, "warn");
        assert_eq!(config.telemetry.log_file, Some(PathBuf::from("/tmp/panics.log")));
    }

    #[test]
    fn test_empty_service_name_is_rejected() {
        let result = RecoveryConfig::from_toml_str(
            r#"
            [telemetry]
            service_name = " "
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(RecoveryConfig::from_toml_str("attach_details = [").is_err());
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = RecoveryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RecoveryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.telemetry.log_level, config.telemetry.log_level);
    }
}

//! Logging infrastructure for the Gremlin query gateway.
//!
//! Provides structured logging (JSON or pretty) on top of
//! `tracing-subscriber`, plus standard event names and helper macros so
//! every crate in the workspace logs with the same field layout.
//!
//! # Usage
//!
//! ```ignore
//! use gremlin_gateway_telemetry::{Telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::new("gremlin-gateway").with_log_level("debug");
//! let telemetry = Telemetry::init(config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Log format name not recognized.
    #[error("unknown log format '{0}' (expected json or pretty)")]
    UnknownLogFormat(String),
}

/// Telemetry handle.
pub struct Telemetry {
    config: TelemetryConfig,
}

impl Telemetry {
    /// Initialize telemetry with the given configuration.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        logging::init_logging(&config)?;
        Ok(Self { config })
    }

    /// Name used to tag this service's events.
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "gremlin-gateway");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_config_builder() {
        let config = TelemetryConfig::new("test-service")
            .with_log_level("debug")
            .with_log_format(LogFormat::Json);

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }
}

//! Structured logging for the gateway.
//!
//! JSON to stdout in production, pretty output while developing.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// Gateway is starting up.
    pub const STARTUP: &str = "startup";

    /// Gateway is shutting down.
    pub const SHUTDOWN: &str = "shutdown";

    /// Gateway is listening on a port.
    pub const LISTENING: &str = "listening";

    /// A query round trip to the engine completed.
    pub const QUERY_COMPLETED: &str = "query_completed";

    /// A query round trip to the engine failed.
    pub const QUERY_FAILED: &str = "query_failed";

    /// Engine health check finished.
    pub const HEALTHCHECK: &str = "healthcheck";

    /// Login attempt was rejected.
    pub const LOGIN_REJECTED: &str = "login_rejected";
}

#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STARTUP,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SHUTDOWN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LISTENING,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_query_completed {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::QUERY_COMPLETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_query_failed {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::QUERY_FAILED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_healthcheck {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::HEALTHCHECK,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_login_rejected {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::LOGIN_REJECTED,
            $($field)*
        )
    };
}

//! Shared infrastructure for the panic recovery middleware.
//!
//! This crate provides:
//! - Configuration management
//! - The process-wide logging sink
//! - DateTime helpers for log entries

pub mod config;
pub mod datetime;
pub mod telemetry;

// Re-export commonly used types
pub use config::{RecoveryConfig, TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use datetime::{format_timestamp, now_utc};
pub use telemetry::{global_sink, init_global_sink, LogSink, SinkKind, TelemetryError};

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;

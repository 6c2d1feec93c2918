//! Testing utilities for the panic recovery middleware
//!
//! This crate provides:
//! - A log sink that captures entries in memory for assertions
//! - Streams and strategies that drive handlers into panics
//!
//! # Examples
//!
//! ```
//! use panic_recovery_testing::capture_sink;
//!
//! let (sink, logs) = capture_sink();
//! sink.in_scope(|| tracing::error!(fault = "test panic", "Recovered from panic"));
//! assert_eq!(logs.single().field("fault"), Some("test panic"));
//! ```

pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use proptest;

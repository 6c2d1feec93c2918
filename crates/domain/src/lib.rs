//! Panic recovery domain types
//!
//! This crate provides the values that flow through the recovery boundary:
//!
//! - **fault**: the recovered panic payload as a sum type with one string rendering
//! - **record**: stack traces, request metadata, and the diagnostic record
//! - **details**: the read-only attachment handed to outer layers
//! - **identifiers**: incident IDs for log correlation
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Utc;
//! use panic_recovery_domain::{DiagnosticRecord, Fault, StackTrace};
//!
//! let record = DiagnosticRecord::new(
//!     Fault::from("test panic"),
//!     StackTrace::single("src/handler.rs:12:9"),
//!     "/echo.Echo/UnaryEcho",
//!     Utc::now(),
//! );
//! assert_eq!(record.fault().to_string(), "test panic");
//! ```

#![warn(missing_docs)]

pub mod details;
pub mod fault;
pub mod identifiers;
pub mod record;

pub use details::PanicDetails;
pub use fault::Fault;
pub use identifiers::IncidentId;
pub use record::{DiagnosticRecord, RequestMetadata, StackTrace};

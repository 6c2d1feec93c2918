//! Recovery core for request-handling pipelines
//!
//! This crate holds the parts every transport adapter shares.
//!
//! ## Modules
//!
//! - `region` - panic hook, `catch_unwind` wrappers for closures and futures
//! - `reporter` - diagnostic records and their log entries
//!
//! ## Usage
//!
//! ```rust
//! use panic_recovery_application::{region, Reporter};
//! use panic_recovery_common::LogSink;
//!
//! let reporter = Reporter::new(LogSink::noop());
//!
//! let outcome = region::catch_unwind(|| -> u32 { panic!("test panic") });
//! let caught = outcome.unwrap_err();
//! let record = reporter.report_now(caught, "/jobs/run", None);
//! assert_eq!(record.fault().to_string(), "test panic");
//! ```

pub mod region;
pub mod reporter;

// Re-export commonly used types
pub use region::{catch_unwind, guard, CaughtPanic, Guarded};
pub use reporter::{Reporter, RECOVERED_MESSAGE};

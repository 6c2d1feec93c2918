//! Recovery metadata attached to the outgoing response.
//!
//! Outer layers find a [`PanicDetails`] in `http::Response` extensions or as
//! the `source` of a `tonic::Status`. It never leaves the process.

use crate::fault::Fault;
use crate::record::DiagnosticRecord;
use std::fmt;
use std::sync::Arc;

/// Shared, read-only handle to the record of a recovered fault
#[derive(Debug, Clone)]
pub struct PanicDetails(Arc<DiagnosticRecord>);

impl PanicDetails {
    /// Well-known name of the attachment
    pub const KEY: &'static str = "panicDetails";

    /// Wrap a record
    pub fn new(record: Arc<DiagnosticRecord>) -> Self {
        Self(record)
    }

    /// The full diagnostic record
    pub fn record(&self) -> &DiagnosticRecord {
        &self.0
    }

    /// The raw fault
    pub fn fault(&self) -> &Fault {
        self.0.fault()
    }
}

impl fmt::Display for PanicDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Self::KEY, self.0.fault())
    }
}

impl std::error::Error for PanicDetails {}

impl From<DiagnosticRecord> for PanicDetails {
    fn from(record: DiagnosticRecord) -> Self {
        Self(Arc::new(record))
    }
}

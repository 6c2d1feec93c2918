//! Diagnostic reporter.
//!
//! Turns a [`CaughtPanic`] into a [`DiagnosticRecord`] and writes exactly one
//! structured entry for it to the log sink. Writing is best effort: anything
//! that goes wrong while logging is swallowed and never changes the outcome
//! of the request.

use crate::region::{self, CaughtPanic};
use chrono::{DateTime, Utc};
use panic_recovery_common::{format_timestamp, global_sink, now_utc, LogSink};
use panic_recovery_domain::{DiagnosticRecord, RequestMetadata};
use tracing::field;

/// Message of every recovery log entry
pub const RECOVERED_MESSAGE: &str = "Recovered from panic";

/// Builds diagnostic records and logs them
#[derive(Debug, Clone)]
pub struct Reporter {
    sink: LogSink,
}

impl Reporter {
    /// Create a reporter writing to `sink`
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    /// Create a reporter writing to the process-wide sink
    pub fn global() -> Self {
        Self::new(global_sink().clone())
    }

    /// The sink entries are written to
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Record a recovered panic that happened while serving `method_or_path`.
    pub fn report(
        &self,
        caught: CaughtPanic,
        method_or_path: &str,
        timestamp: DateTime<Utc>,
        request: Option<RequestMetadata>,
    ) -> DiagnosticRecord {
        let CaughtPanic {
            fault,
            stack,
            location,
        } = caught;

        let record = DiagnosticRecord::new(fault, stack, method_or_path, timestamp)
            .with_location(location)
            .with_request(request);

        self.emit(&record);
        record
    }

    /// [`report`](Self::report) stamped with the current time
    pub fn report_now(
        &self,
        caught: CaughtPanic,
        method_or_path: &str,
        request: Option<RequestMetadata>,
    ) -> DiagnosticRecord {
        self.report(caught, method_or_path, now_utc(), request)
    }

    fn emit(&self, record: &DiagnosticRecord) {
        // A panicking writer or formatter loses this entry, nothing more.
        let service = self.sink.service_name();
        let _ = region::catch_unwind(|| self.sink.in_scope(|| log_record(service, record)));
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::global()
    }
}

fn log_record(service: &str, record: &DiagnosticRecord) {
    let request = record.request();

    tracing::error!(
        service,
        incident_id = %record.incident_id(),
        fault = %record.fault(),
        fault_kind = record.fault().kind(),
        stack = %record.stack(),
        location = record.location(),
        method = record.method_or_path(),
        timestamp = %format_timestamp(&record.timestamp()),
        http.method = request.and_then(|r| r.method.as_deref()),
        http.path = request.and_then(|r| r.path.as_deref()),
        peer = request.and_then(|r| r.remote_addr).map(field::display),
        "{}",
        RECOVERED_MESSAGE
    );
}

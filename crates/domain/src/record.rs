//! Diagnostic records produced for every recovered fault.

use crate::fault::Fault;
use crate::identifiers::IncidentId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::net::SocketAddr;

/// Ordered call stack of a fault, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackTrace {
    frames: Vec<String>,
}

impl StackTrace {
    /// Build a trace from already rendered frames
    pub fn from_frames(frames: Vec<String>) -> Self {
        Self { frames }
    }

    /// A trace consisting of a single code location
    pub fn single(frame: impl Into<String>) -> Self {
        Self {
            frames: vec![frame.into()],
        }
    }

    /// Split a captured backtrace into frames.
    ///
    /// Each frame is the symbol name followed by its source location when the
    /// backtrace has one. Backtraces that were not captured yield an empty trace.
    pub fn from_backtrace(backtrace: &Backtrace) -> Self {
        if backtrace.status() != BacktraceStatus::Captured {
            return Self::default();
        }

        let mut frames: Vec<String> = Vec::new();
        for line in backtrace.to_string().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(location) = line.strip_prefix("at ") {
                if let Some(frame) = frames.last_mut() {
                    frame.push_str(" at ");
                    frame.push_str(location);
                    continue;
                }
            }

            let symbol = match line.split_once(": ") {
                Some((index, symbol)) if index.chars().all(|c| c.is_ascii_digit()) => symbol,
                _ => line,
            };
            frames.push(symbol.to_string());
        }

        Self { frames }
    }

    /// The frames, innermost first
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the trace holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{index:>4}: {frame}")?;
        }
        Ok(())
    }
}

/// Transport metadata of the request that faulted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// HTTP verb
    pub method: Option<String>,

    /// URL path
    pub path: Option<String>,

    /// Address of the calling peer
    pub remote_addr: Option<SocketAddr>,
}

impl RequestMetadata {
    /// Metadata of an HTTP request
    pub fn http(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            path: Some(path.into()),
            remote_addr: None,
        }
    }

    /// Set the peer address
    pub fn with_remote_addr(mut self, remote_addr: Option<SocketAddr>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.method.is_none() && self.path.is_none() && self.remote_addr.is_none()
    }
}

/// Structured description of one recovered fault.
///
/// Built once by the reporter, then shared read-only.
#[derive(Debug, Clone)]
pub struct DiagnosticRecord {
    incident_id: IncidentId,
    fault: Fault,
    stack: StackTrace,
    location: Option<String>,
    method_or_path: String,
    timestamp: DateTime<Utc>,
    request: Option<RequestMetadata>,
}

impl DiagnosticRecord {
    /// Create a record with a fresh incident ID
    pub fn new(
        fault: Fault,
        stack: StackTrace,
        method_or_path: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            incident_id: IncidentId::new(),
            fault,
            stack,
            location: None,
            method_or_path: method_or_path.into(),
            timestamp,
            request: None,
        }
    }

    /// Set the source location the panic was raised at
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    /// Attach transport metadata; empty metadata is dropped
    pub fn with_request(mut self, request: Option<RequestMetadata>) -> Self {
        self.request = request.filter(|r| !r.is_empty());
        self
    }

    /// Identifier used to correlate the log entry with this record
    pub fn incident_id(&self) -> IncidentId {
        self.incident_id
    }

    /// The recovered fault
    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    /// Stack at the point of the panic
    pub fn stack(&self) -> &StackTrace {
        &self.stack
    }

    /// `file:line:column` of the panic, when known
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// RPC method or HTTP path of the request
    pub fn method_or_path(&self) -> &str {
        &self.method_or_path
    }

    /// When the fault was caught
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Transport metadata, if any was supplied
    pub fn request(&self) -> Option<&RequestMetadata> {
        self.request.as_ref()
    }

    /// Render the record as JSON for export
    pub fn to_json(&self) -> Value {
        json!({
            "incident_id": self.incident_id,
            "fault": self.fault.message(),
            "fault_kind": self.fault.kind(),
            "stack": self.stack,
            "location": self.location,
            "method": self.method_or_path,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "request": self.request,
        })
    }
}

//! gRPC interceptors recovering from handler panics
//!
//! Tonic's `Interceptor` only sees the request, so recovery is applied around
//! the handler call instead: service implementations route each method
//! through [`UnaryRecoveryInterceptor::intercept`] or
//! [`StreamRecoveryInterceptor::intercept`]. To cover every method of a
//! server at once, use [`GrpcRecoveryLayer`](crate::layer::GrpcRecoveryLayer).

pub mod stream;
pub mod unary;

pub use stream::{RecoveringStream, StreamRecoveryInterceptor};
pub use unary::UnaryRecoveryInterceptor;

use crate::error::GrpcError;
use panic_recovery_application::{region, CaughtPanic, Reporter};
use panic_recovery_common::{init_global_sink, RecoveryConfig};
use panic_recovery_domain::{PanicDetails, RequestMetadata};
use std::net::SocketAddr;
use tonic::Status;

/// Information about a unary call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryServerInfo {
    /// `/package.Service/Method`
    pub full_method: String,
}

impl UnaryServerInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }
}

/// Information about a streaming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamServerInfo {
    /// `/package.Service/Method`
    pub full_method: String,
    /// The client sends a stream of messages
    pub is_client_stream: bool,
    /// The server sends a stream of messages
    pub is_server_stream: bool,
}

impl StreamServerInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
            is_client_stream: false,
            is_server_stream: true,
        }
    }

    pub fn bidirectional(full_method: impl Into<String>) -> Self {
        Self {
            is_client_stream: true,
            ..Self::new(full_method)
        }
    }
}

/// What the interceptors and the layer do with a caught panic
#[derive(Debug, Clone)]
pub(crate) struct RecoveryPolicy {
    reporter: Reporter,
    attach_details: bool,
}

impl RecoveryPolicy {
    pub(crate) fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            attach_details: true,
        }
    }

    pub(crate) fn from_config(config: &RecoveryConfig) -> Self {
        region::configure_panic_hook(config.forward_to_previous_hook);
        Self {
            reporter: Reporter::new(init_global_sink(&config.telemetry).clone()),
            attach_details: config.attach_details,
        }
    }

    pub(crate) fn set_attach_details(&mut self, attach: bool) {
        self.attach_details = attach;
    }

    /// Report the panic and build the shared details
    pub(crate) fn report(
        &self,
        caught: CaughtPanic,
        full_method: &str,
        remote_addr: Option<SocketAddr>,
    ) -> PanicDetails {
        let metadata = RequestMetadata::default().with_remote_addr(remote_addr);
        PanicDetails::from(self.reporter.report_now(caught, full_method, Some(metadata)))
    }

    /// Status returned to the caller
    pub(crate) fn status(&self, details: &PanicDetails) -> Status {
        if self.attach_details {
            GrpcError::Panic(details.clone()).into()
        } else {
            GrpcError::PanicMessage(details.fault().to_string()).into()
        }
    }

    pub(crate) fn attach_details(&self) -> bool {
        self.attach_details
    }

    pub(crate) fn recover(
        &self,
        caught: CaughtPanic,
        full_method: &str,
        remote_addr: Option<SocketAddr>,
    ) -> Status {
        let details = self.report(caught, full_method, remote_addr);
        self.status(&details)
    }
}

//! Error module

use panic_recovery_domain::{Fault, PanicDetails};
use std::sync::Arc;
use thiserror::Error;
use tonic::{Code, Status};

/// Prefix of the message of every status produced for a recovered panic
pub const PANIC_MESSAGE_PREFIX: &str = "panic occurred: ";

#[derive(Debug, Error)]
pub enum GrpcError {
    /// A handler panicked; the details travel as the status source
    #[error("panic occurred: {}", .0.fault())]
    Panic(PanicDetails),

    /// A handler panicked; only the message is kept
    #[error("panic occurred: {0}")]
    PanicMessage(String),
}

impl From<GrpcError> for Status {
    fn from(err: GrpcError) -> Self {
        match err {
            GrpcError::Panic(details) => {
                let mut status = Status::new(Code::Internal, panic_message(details.fault()));
                status.set_source(Arc::new(details));
                status
            }
            GrpcError::PanicMessage(message) => {
                Status::new(Code::Internal, format!("{PANIC_MESSAGE_PREFIX}{message}"))
            }
        }
    }
}

/// Client-facing message for a recovered fault
pub fn panic_message(fault: &Fault) -> String {
    format!("{PANIC_MESSAGE_PREFIX}{fault}")
}

/// The recovery details attached to a status, if it was produced by recovery
pub fn panic_details(status: &Status) -> Option<&PanicDetails> {
    std::error::Error::source(status)?.downcast_ref::<PanicDetails>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use panic_recovery_testing::sample_record;

    #[test]
    fn test_panic_maps_to_internal_with_details() {
        let details = PanicDetails::from(sample_record("test panic", "/svc/Method"));
        let status: Status = GrpcError::Panic(details).into();

        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "panic occurred: test panic");
        let attached = panic_details(&status).expect("details attached");
        assert_eq!(attached.record().method_or_path(), "/svc/Method");
    }

    #[test]
    fn test_panic_message_has_no_details() {
        let status: Status = GrpcError::PanicMessage("test panic".into()).into();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "panic occurred: test panic");
        assert!(panic_details(&status).is_none());
    }

    #[test]
    fn test_ordinary_status_has_no_details() {
        assert!(panic_details(&Status::not_found("missing")).is_none());
    }
}

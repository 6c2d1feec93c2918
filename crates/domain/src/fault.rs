//! The value captured when a handler panics.
//!
//! Panic payloads are `Box<dyn Any + Send>`, so the recovery boundary cannot
//! constrain their shape. [`Fault`] narrows them into three cases and renders
//! all of them through one [`Display`](fmt::Display) implementation, which is
//! used both for log entries and for client-facing error messages.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Rendering used for payloads that are neither strings nor errors
pub const OPAQUE_PAYLOAD: &str = "unknown panic payload";

const UNPRINTABLE_ERROR: &str = "<error display panicked>";

/// A recovered panic payload
#[derive(Debug, Clone)]
pub enum Fault {
    /// `panic!("...")` with a literal or formatted message
    Message(String),

    /// A panic raised with an error value via `std::panic::panic_any`
    Error {
        /// The error's `Display` output, rendered once when the fault was caught
        message: String,
        /// The error itself
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    /// Any other payload type
    Opaque,
}

impl Fault {
    /// Classify a payload returned by `std::panic::catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send + 'static>) -> Self {
        let payload = match payload.downcast::<&'static str>() {
            Ok(message) => return Fault::Message((*message).to_string()),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<String>() {
            Ok(message) => return Fault::Message(*message),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Fault>() {
            Ok(fault) => return *fault,
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync + 'static>>() {
            Ok(err) => return Self::from_error(Arc::from(*err)),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<anyhow::Error>() {
            Ok(err) => {
                let err: Box<dyn StdError + Send + Sync + 'static> = (*err).into();
                return Self::from_error(Arc::from(err));
            }
            Err(payload) => payload,
        };
        match payload.downcast::<std::io::Error>() {
            Ok(err) => Self::from_error(Arc::new(*err)),
            Err(_) => Fault::Opaque,
        }
    }

    /// Wrap an error value.
    ///
    /// The error is rendered immediately. A `Display` impl that itself panics
    /// yields a placeholder message instead of propagating.
    pub fn from_error(source: Arc<dyn StdError + Send + Sync + 'static>) -> Self {
        let message = panic::catch_unwind(AssertUnwindSafe(|| source.to_string()))
            .unwrap_or_else(|_| UNPRINTABLE_ERROR.to_string());
        Fault::Error { message, source }
    }

    /// Short name of the payload category, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::Message(_) => "message",
            Fault::Error { .. } => "error",
            Fault::Opaque => "opaque",
        }
    }

    /// The canonical string form of the fault
    pub fn message(&self) -> &str {
        match self {
            Fault::Message(message) => message,
            Fault::Error { message, .. } => message,
            Fault::Opaque => OPAQUE_PAYLOAD,
        }
    }

    /// The underlying error, when the panic payload was an error value
    pub fn error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Fault::Error { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Fault::Message(message.to_string())
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Fault::Message(message)
    }
}

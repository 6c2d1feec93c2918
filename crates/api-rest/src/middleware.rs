//! HTTP middleware components.

pub mod recover;

pub use recover::{HttpErrorHandler, RecoverLayer, RecoverService, RequestHead};

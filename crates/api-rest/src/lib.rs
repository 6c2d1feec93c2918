//! Panic recovery for axum and other tower-based HTTP servers
//!
//! [`RecoverLayer`] wraps a router or a single service. Requests that complete
//! normally pass through untouched; a handler that panics produces a
//! `500 Internal Server Error` with a plain-text body, and the panic is
//! reported once with its stack trace, the request path and the HTTP method.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use panic_recovery_http::RecoverLayer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/", get(|| async { "Hello, World!" }))
//!         .layer(RecoverLayer::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
//!         .await
//!         .expect("Failed to bind");
//!
//!     axum::serve(listener, app).await.expect("Server error");
//! }
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod middleware;

// Re-export commonly used types
pub use error::{internal_server_error, INTERNAL_SERVER_ERROR_BODY};
pub use middleware::{HttpErrorHandler, RecoverLayer, RecoverService, RequestHead};

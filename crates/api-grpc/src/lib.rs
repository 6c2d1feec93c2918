//! Panic recovery for tonic gRPC servers
//!
//! Two ways to install it:
//!
//! - [`GrpcRecoveryLayer`] wraps a whole server (`Server::builder().layer(..)`
//!   or [`server::builder`]) and converts any panic raised by a handler into a
//!   `grpc-status: 13` response.
//! - [`UnaryRecoveryInterceptor`] and [`StreamRecoveryInterceptor`] wrap a
//!   single handler call, for services that route methods by hand.
//!
//! Either way the panic is reported once through the configured log sink and
//! the caller receives `Status::internal("panic occurred: <fault>")`. With
//! details attached, [`panic_details`] recovers the full diagnostic record
//! from the returned status.

pub mod error;
pub mod interceptors;
pub mod layer;
pub mod server;

pub use error::{panic_details, panic_message, GrpcError, PANIC_MESSAGE_PREFIX};
pub use interceptors::{
    RecoveringStream, StreamRecoveryInterceptor, StreamServerInfo, UnaryRecoveryInterceptor,
    UnaryServerInfo,
};
pub use layer::{GrpcRecoveryLayer, GrpcRecoveryService, RecoveringBody};
pub use server::RecoveringServer;

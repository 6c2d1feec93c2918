//! gRPC server builder with recovery installed

use crate::layer::GrpcRecoveryLayer;
use panic_recovery_common::RecoveryConfig;
use tonic::transport::Server;
use tower::layer::util::{Identity, Stack};

/// Server builder whose every route runs behind [`GrpcRecoveryLayer`]
pub type RecoveringServer = Server<Stack<GrpcRecoveryLayer, Identity>>;

/// Start a tonic server builder with recovery configured from `config`.
///
/// Services added afterwards with `add_service` are covered, including
/// streaming methods.
pub fn builder(config: &RecoveryConfig) -> RecoveringServer {
    Server::builder().layer(GrpcRecoveryLayer::from_config(config))
}

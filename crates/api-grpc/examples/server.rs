//! gRPC server with panic recovery on every route
//!
//! Run with:
//! cargo run --example server
//!
//! Then call the faulty method, for example with
//! `grpcurl -plaintext -d '{}' localhost:50051 demo.Faulty/Explode`,
//! and observe `Internal: panic occurred: boom` and a single log entry.

use panic_recovery_common::RecoveryConfig;
use panic_recovery_grpc::server;
use std::convert::Infallible;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tower::Service;

/// Service whose every method panics
#[derive(Debug, Clone, Default)]
struct Faulty;

impl NamedService for Faulty {
    const NAME: &'static str = "demo.Faulty";
}

impl Service<http::Request<BoxBody>> for Faulty {
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<BoxBody>) -> Self::Future {
        panic!("boom: {}", req.uri().path());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RecoveryConfig::from_toml_str(
        r#"
        attach_details = true

        [telemetry]
        service_name = "recovery-demo"
        json_logging = false
        log_level = "info"
        "#,
    )?;

    let (_health_reporter, health_service) = tonic_health::server::health_reporter();

    let addr = "0.0.0.0:50051".parse()?;
    tracing::info!("Starting gRPC server example on {}", addr);

    server::builder(&config)
        .add_service(health_service)
        .add_service(Faulty)
        .serve(addr)
        .await?;

    Ok(())
}

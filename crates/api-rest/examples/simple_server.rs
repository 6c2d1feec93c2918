//! HTTP server whose routes are covered by panic recovery.
//!
//! Run with:
//! ```bash
//! cargo run --example simple_server
//! ```
//!
//! `curl -i localhost:8080/panic` answers `500 Internal Server Error` and the
//! panic is logged once; `curl -i localhost:8080/teapot` shows a custom handler.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use panic_recovery_common::RecoveryConfig;
use panic_recovery_http::RecoverLayer;
use std::net::SocketAddr;

async fn panics() -> &'static str {
    panic!("test panic")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RecoveryConfig::from_toml_str(
        r#"
        [telemetry]
        json_logging = false
        "#,
    )?;

    let teapot = Router::new()
        .route("/teapot", get(panics))
        .layer(RecoverLayer::from_config(&config).with_handler(|head, fault| {
            let body = format!("{} {}: {}\n", head.method, head.path(), fault);
            (StatusCode::IM_A_TEAPOT, body).into_response()
        }));

    let app = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/panic", get(panics))
        .layer(RecoverLayer::from_config(&config))
        .merge(teapot);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    println!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

//! Recovery behavior of a full axum router

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use futures::StreamExt as _;
use http_body_util::BodyExt;
use panic_recovery_application::Reporter;
use panic_recovery_http::{RecoverLayer, INTERNAL_SERVER_ERROR_BODY};
use panic_recovery_testing::proptest::prelude::*;
use panic_recovery_testing::{capture_sink, CapturedLogs, TEST_PANIC};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

async fn boom() -> String {
    panic!("{}", TEST_PANIC)
}

async fn echo(body: Bytes) -> impl IntoResponse {
    ([("x-echo", "1")], body)
}

async fn stream_then_panic() -> Body {
    let chunks = futures::stream::iter(0..2).map(|chunk| {
        if chunk == 1 {
            panic!("{}", TEST_PANIC);
        }
        Ok::<_, std::io::Error>(Bytes::from_static(b"first"))
    });
    Body::from_stream(chunks)
}

fn routes() -> Router {
    Router::new()
        .route("/panic", get(boom))
        .route("/echo", post(echo))
        .route("/stream", get(stream_then_panic))
}

fn recovering_app() -> (Router, CapturedLogs) {
    let (sink, logs) = capture_sink();
    let app = routes().layer(RecoverLayer::with_reporter(Reporter::new(sink)));
    (app, logs)
}

fn get_request(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_panic_returns_internal_server_error() {
    let (app, logs) = recovering_app();

    let response = app.oneshot(get_request("/panic")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_string(response).await, "Internal Server Error\n");

    let event = logs.single();
    assert_eq!(event.field("fault"), Some(TEST_PANIC));
    assert_eq!(event.field("method"), Some("/panic"));
    assert_eq!(event.field("http.method"), Some("GET"));
    assert!(!event.field("stack").unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_custom_handler_replaces_default() {
    let (sink, logs) = capture_sink();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let layer = RecoverLayer::with_reporter(Reporter::new(sink)).with_handler(move |head, fault| {
        seen.fetch_add(1, Ordering::SeqCst);
        let body = format!("{} failed: {}", head.path(), fault);
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    });
    let app = routes().layer(layer);

    let response = app.oneshot(get_request("/panic")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(response).await, "/panic failed: test panic");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_absent_custom_handler_behaves_like_default() {
    let (sink, logs) = capture_sink();
    let app = routes().layer(RecoverLayer::with_reporter(Reporter::new(sink)).with_optional_handler(None));

    let response = app.oneshot(get_request("/panic")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, INTERNAL_SERVER_ERROR_BODY);
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_nested_layers_recover_once() {
    let (sink, logs) = capture_sink();
    let reporter = Reporter::new(sink);
    let app = routes()
        .layer(RecoverLayer::with_reporter(reporter.clone()))
        .layer(RecoverLayer::with_reporter(reporter));

    let response = app.oneshot(get_request("/panic")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_concurrent_panics_are_reported_separately() {
    let (app, logs) = recovering_app();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { app.oneshot(get_request("/panic")).await.unwrap() })
        })
        .collect();

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let events = logs.events();
    assert_eq!(events.len(), 8);
    let mut ids: Vec<_> = events
        .iter()
        .map(|event| event.field("incident_id").unwrap().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
}

#[tokio::test]
async fn test_unknown_route_passes_through() {
    let (app, logs) = recovering_app();

    let response = app.oneshot(get_request("/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_panic_while_streaming_ends_body_with_error() {
    let (app, logs) = recovering_app();

    let response = app.oneshot(get_request("/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let first = body.frame().await.unwrap().unwrap();
    assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"first"));
    assert!(body.frame().await.unwrap().is_err());
    assert!(body.frame().await.is_none());

    let event = logs.single();
    assert_eq!(event.field("fault"), Some(TEST_PANIC));
    assert_eq!(event.field("method"), Some("/stream"));
    assert_eq!(event.field("http.method"), Some("GET"));
}

#[tokio::test]
async fn test_streaming_panic_is_reported_despite_custom_handler() {
    let (sink, logs) = capture_sink();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let reporter = Reporter::new(sink);
    let app = routes()
        .layer(
            RecoverLayer::with_reporter(reporter.clone()).with_handler(move |_head, _fault| {
                seen.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }),
        )
        .layer(RecoverLayer::with_reporter(reporter));

    let response = app.oneshot(get_request("/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.into_body().collect().await.is_err());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(logs.len(), 1);
}

proptest! {
    #[test]
    fn prop_body_passes_through_unchanged(payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (app, logs) = recovering_app();

        let response = runtime.block_on(app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo")
                .body(Body::from(payload.clone()))
                .unwrap(),
        ))
        .unwrap();

        prop_assert_eq!(response.status(), StatusCode::OK);
        prop_assert_eq!(&response.headers()["x-echo"], "1");
        let body = runtime
            .block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        prop_assert_eq!(body.as_ref(), payload.as_slice());
        prop_assert!(logs.is_empty());
    }
}

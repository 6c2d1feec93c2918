//! End-to-end tests for the recovery region and the reporter
//!
//! A panic is caught, reported, and the process keeps going, whatever the
//! state of the log sink.

use panic_recovery_application::{catch_unwind, guard, Reporter, RECOVERED_MESSAGE};
use panic_recovery_common::{LogSink, TelemetryConfig};
use panic_recovery_domain::RequestMetadata;
use panic_recovery_testing::{capture_sink, TEST_PANIC};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// Layer that panics on every event, like a broken writer
struct ExplodingLayer;

impl<S: Subscriber> Layer<S> for ExplodingLayer {
    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
        panic!("sink exploded");
    }
}

// ============================================================================
// Reporting
// ============================================================================

#[test]
fn test_caught_panic_is_reported_with_location() {
    // Arrange
    let (sink, logs) = capture_sink();
    let reporter = Reporter::new(sink);

    // Act
    let caught = catch_unwind(|| -> () { panic!("{}", TEST_PANIC) }).unwrap_err();
    let record = reporter.report_now(caught, "/echo.Echo/UnaryEcho", None);

    // Assert
    assert_eq!(record.fault().to_string(), TEST_PANIC);
    assert!(record.location().unwrap().contains("recovery_tests.rs"));

    let event = logs.single();
    assert_eq!(event.message.as_deref(), Some(RECOVERED_MESSAGE));
    assert_eq!(event.field("method"), Some("/echo.Echo/UnaryEcho"));
    assert!(!event.field("stack").unwrap_or_default().is_empty());
}

#[test]
fn test_panicking_sink_does_not_escape_reporter() {
    let reporter = Reporter::new(LogSink::from_subscriber(
        Registry::default().with(ExplodingLayer),
    ));

    let caught = catch_unwind(|| -> () { panic!("{}", TEST_PANIC) }).unwrap_err();
    let record = reporter.report_now(caught, "/orders", Some(RequestMetadata::http("GET", "/orders")));

    assert_eq!(record.fault().to_string(), TEST_PANIC);
}

#[test]
fn test_fallback_sink_accepts_reports() {
    let config = TelemetryConfig {
        log_file: Some("/nonexistent-panic-recovery-dir/sub/panics.log".into()),
        ..TelemetryConfig::default()
    };
    let sink = LogSink::from_config(&config);
    assert!(sink.is_noop());

    let caught = catch_unwind(|| -> () { panic!("{}", TEST_PANIC) }).unwrap_err();
    let record = Reporter::new(sink).report_now(caught, "/orders", None);

    assert_eq!(record.method_or_path(), "/orders");
}

// ============================================================================
// Async handlers
// ============================================================================

#[tokio::test]
async fn test_guarded_handler_survives_panic_between_awaits() {
    let (sink, logs) = capture_sink();
    let reporter = Reporter::new(sink);

    let result = guard(async {
        tokio::task::yield_now().await;
        if true {
            panic!("{}", TEST_PANIC);
        }
        "unreachable"
    })
    .await;

    let caught = result.unwrap_err();
    reporter.report_now(caught, "/stream", None);
    assert_eq!(logs.single().field("fault"), Some(TEST_PANIC));

    // The runtime keeps serving
    let value = guard(async { 42 }).await.unwrap();
    assert_eq!(value, 42);
}

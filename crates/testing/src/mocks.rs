//! In-memory log capture for asserting on recovery log entries.

use panic_recovery_common::LogSink;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// One recorded log event
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Value of a field, rendered as text
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Shared buffer of captured events
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// The only captured event; panics unless exactly one was recorded
    pub fn single(&self) -> CapturedEvent {
        let events = self.events.read();
        assert_eq!(events.len(), 1, "expected exactly one event, got {events:?}");
        events[0].clone()
    }
}

/// `tracing` layer appending every event to a [`CapturedLogs`]
pub struct CaptureLayer {
    logs: CapturedLogs,
}

impl CaptureLayer {
    pub fn new(logs: CapturedLogs) -> Self {
        Self { logs }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.logs.events.write().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

/// A sink that records every entry, plus a handle to read them back
pub fn capture_sink() -> (LogSink, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = Registry::default().with(CaptureLayer::new(logs.clone()));
    (LogSink::from_subscriber(subscriber), logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink_records_fields() {
        let (sink, logs) = capture_sink();
        sink.in_scope(|| {
            tracing::error!(fault = %"boom", method = "/a", count = 3, "Recovered");
        });

        let event = logs.single();
        assert_eq!(event.level, Level::ERROR);
        assert_eq!(event.message.as_deref(), Some("Recovered"));
        assert_eq!(event.field("fault"), Some("boom"));
        assert_eq!(event.field("method"), Some("/a"));
        assert_eq!(event.field("count"), Some("3"));
    }

    #[test]
    fn test_sinks_are_isolated() {
        let (first, first_logs) = capture_sink();
        let (_second, second_logs) = capture_sink();
        first.in_scope(|| tracing::info!("only here"));
        assert_eq!(first_logs.len(), 1);
        assert!(second_logs.is_empty());
    }
}

//! Process-wide logging sink.
//!
//! The sink owns a `tracing` [`Dispatch`] built the same way as a service's
//! main subscriber (registry, filter, JSON or pretty `fmt` layer), but it is
//! not installed as the global default: recovery entries are emitted through
//! [`LogSink::in_scope`], so the host keeps full control of its own
//! subscriber. When the structured sink cannot be built, a no-op sink takes
//! its place and every log call still succeeds.

use crate::config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::subscriber::NoSubscriber;
use tracing::{Dispatch, Subscriber};
use tracing_subscriber::{
    filter::ParseError,
    fmt::{self, writer::BoxMakeWriter},
    layer::{Layered, SubscriberExt},
    EnvFilter, Layer, Registry,
};

/// Errors raised while constructing the structured sink
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter '{filter}': {source}")]
    InvalidFilter {
        /// The rejected directive
        filter: String,
        /// Parser error
        #[source]
        source: ParseError,
    },

    /// The log file could not be opened for appending
    #[error("Failed to open log file {}: {source}", path.display())]
    LogFile {
        /// Requested file
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// Another subscriber is already the global default
    #[error("Failed to install global subscriber: {0}")]
    GlobalDefault(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// Which implementation backs a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// JSON or pretty `fmt` output
    Structured,
    /// Discards every entry
    Noop,
    /// Caller-supplied subscriber
    Custom,
}

/// Destination for diagnostic log entries
#[derive(Debug, Clone)]
pub struct LogSink {
    dispatch: Dispatch,
    kind: SinkKind,
    service_name: Arc<str>,
}

static GLOBAL_SINK: OnceLock<LogSink> = OnceLock::new();

type FilteredRegistry = Layered<EnvFilter, Registry>;

impl LogSink {
    /// Build the structured sink described by `config`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use panic_recovery_common::{config::TelemetryConfig, telemetry::LogSink};
    ///
    /// let sink = LogSink::production(&TelemetryConfig::default())
    ///     .expect("Failed to build log sink");
    /// sink.in_scope(|| tracing::info!("sink ready"));
    /// ```
    pub fn production(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let filter =
            EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::InvalidFilter {
                filter: config.log_level.clone(),
                source,
            })?;

        let writer = match &config.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| TelemetryError::LogFile {
                        path: path.clone(),
                        source,
                    })?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            None => BoxMakeWriter::new(std::io::stderr),
        };

        let layer: Box<dyn Layer<FilteredRegistry> + Send + Sync> = if config.json_logging {
            json_layer(writer).boxed()
        } else {
            pretty_layer(writer).boxed()
        };

        let subscriber = Registry::default().with(filter).with(layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            kind: SinkKind::Structured,
            service_name: Arc::from(config.service_name.as_str()),
        })
    }

    /// A sink that accepts and discards every entry
    pub fn noop() -> Self {
        Self {
            dispatch: Dispatch::new(NoSubscriber::default()),
            kind: SinkKind::Noop,
            service_name: Arc::from(DEFAULT_SERVICE_NAME),
        }
    }

    /// Wrap an arbitrary subscriber
    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self {
            dispatch: Dispatch::new(subscriber),
            kind: SinkKind::Custom,
            service_name: Arc::from(DEFAULT_SERVICE_NAME),
        }
    }

    /// Record entries under `service_name`
    pub fn with_service_name(mut self, service_name: impl AsRef<str>) -> Self {
        self.service_name = Arc::from(service_name.as_ref());
        self
    }

    /// Service name recorded on every entry
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The structured sink, or the no-op sink if it cannot be built
    pub fn from_config(config: &TelemetryConfig) -> Self {
        match Self::production(config) {
            Ok(sink) => sink,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    service = %config.service_name,
                    "Structured log sink unavailable, falling back to no-op sink"
                );
                Self::noop().with_service_name(&config.service_name)
            }
        }
    }

    /// Run `f` with this sink as the current subscriber
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Which implementation backs this sink
    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    /// Whether entries are discarded
    pub fn is_noop(&self) -> bool {
        self.kind == SinkKind::Noop
    }

    /// The underlying dispatcher
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Make this sink the process-wide default subscriber as well.
    ///
    /// Optional; useful for binaries that have no subscriber of their own.
    pub fn install_as_global_default(&self) -> Result<(), TelemetryError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())?;
        Ok(())
    }
}

/// Initialize the process-wide sink.
///
/// The first call wins; later calls return the sink built by the first one.
pub fn init_global_sink(config: &TelemetryConfig) -> &'static LogSink {
    GLOBAL_SINK.get_or_init(|| LogSink::from_config(config))
}

/// The process-wide sink, initialized with defaults on first use
pub fn global_sink() -> &'static LogSink {
    GLOBAL_SINK.get_or_init(|| LogSink::from_config(&TelemetryConfig::default()))
}

/// Create a JSON logging layer
fn json_layer<S>(writer: BoxMakeWriter) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
}

/// Create a pretty-formatted logging layer
fn pretty_layer<S>(writer: BoxMakeWriter) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .pretty()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
}

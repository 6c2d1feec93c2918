//! Panic recovery middleware.
//!
//! [`RecoverLayer`] catches a panic raised while a handler runs and turns it
//! into a response. By default the panic is reported through the log sink and
//! the client receives [`internal_server_error`]. With a custom handler the
//! handler alone decides the response and nothing is logged.
//!
//! A panic while the response body streams comes after the status line, so no
//! replacement response is possible: the panic is reported and the body ends
//! with an error, which aborts the response on the wire. This path is always
//! reported, with or without a custom handler.

use crate::error::internal_server_error;
use axum::{body::Body, extract::ConnectInfo};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, Request, Response, Uri, Version};
use http_body::{Body as HttpBody, Frame, SizeHint};
use panic_recovery_application::{region, CaughtPanic, Reporter};
use panic_recovery_common::RecoveryConfig;
use panic_recovery_domain::{Fault, PanicDetails, RequestMetadata};
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Parts of the request still available once its handler has panicked
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Peer address, when the server was started with connect info
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    fn capture<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
            remote_addr: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }

    /// Request path, the identifier used in diagnostic records
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Caller-supplied response for a recovered panic
pub type HttpErrorHandler = Arc<dyn Fn(&RequestHead, &Fault) -> Response<Body> + Send + Sync>;

#[derive(Clone)]
struct Recovery {
    reporter: Reporter,
    handler: Option<HttpErrorHandler>,
    attach_details: bool,
}

impl Recovery {
    fn respond(&self, head: &RequestHead, caught: CaughtPanic) -> Response<Body> {
        if let Some(handler) = &self.handler {
            match region::catch_unwind(|| handler(head, &caught.fault)) {
                Ok(response) => return response,
                Err(handler_panic) => return self.report_default(head, handler_panic),
            }
        }
        self.report_default(head, caught)
    }

    fn report_default(&self, head: &RequestHead, caught: CaughtPanic) -> Response<Body> {
        let details = self.report(head, caught);

        let mut response = internal_server_error();
        if self.attach_details {
            response.extensions_mut().insert(details);
        }
        response
    }

    fn report(&self, head: &RequestHead, caught: CaughtPanic) -> PanicDetails {
        let metadata = RequestMetadata::http(head.method.as_str(), head.path())
            .with_remote_addr(head.remote_addr);
        PanicDetails::from(
            self.reporter
                .report_now(caught, head.path(), Some(metadata)),
        )
    }
}

impl fmt::Debug for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovery")
            .field("reporter", &self.reporter)
            .field("custom_handler", &self.handler.is_some())
            .field("attach_details", &self.attach_details)
            .finish()
    }
}

/// Layer for panic recovery
#[derive(Debug, Clone)]
pub struct RecoverLayer {
    recovery: Recovery,
}

impl RecoverLayer {
    /// Create a new layer logging to the process-wide sink
    pub fn new() -> Self {
        Self::with_reporter(Reporter::global())
    }

    /// Create a new layer logging through `reporter`
    pub fn with_reporter(reporter: Reporter) -> Self {
        Self {
            recovery: Recovery {
                reporter,
                handler: None,
                attach_details: true,
            },
        }
    }

    /// Create a new layer from the host's configuration
    pub fn from_config(config: &RecoveryConfig) -> Self {
        region::configure_panic_hook(config.forward_to_previous_hook);
        let sink = panic_recovery_common::init_global_sink(&config.telemetry);
        Self::with_reporter(Reporter::new(sink.clone())).attach_details(config.attach_details)
    }

    /// Answer panics with `handler` instead of the logged 500 response.
    ///
    /// The handler is responsible for any reporting. If it panics itself, the
    /// default response is used and that second panic is logged.
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&RequestHead, &Fault) -> Response<Body> + Send + Sync + 'static,
    {
        self.with_optional_handler(Some(Arc::new(handler)))
    }

    /// Same as [`with_handler`](Self::with_handler); `None` keeps the default
    pub fn with_optional_handler(mut self, handler: Option<HttpErrorHandler>) -> Self {
        self.recovery.handler = handler;
        self
    }

    /// Whether default recovery responses carry `PanicDetails` in their extensions
    pub fn attach_details(mut self, attach: bool) -> Self {
        self.recovery.attach_details = attach;
        self
    }
}

impl Default for RecoverLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for RecoverLayer {
    type Service = RecoverService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoverService {
            inner,
            recovery: self.recovery.clone(),
        }
    }
}

/// Service that performs panic recovery
#[derive(Debug, Clone)]
pub struct RecoverService<S> {
    inner: S,
    recovery: Recovery,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RecoverService<S>
where
    S: Service<Request<ReqBody>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let recovery = self.recovery.clone();
        let head = Arc::new(RequestHead::capture(&req));

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let future = match region::catch_unwind(move || inner.call(req)) {
            Ok(future) => future,
            Err(caught) => {
                let response = recovery.respond(&head, caught);
                return Box::pin(async move { Ok(response) });
            }
        };

        Box::pin(async move {
            match region::guard(future).await {
                Ok(Ok(response)) => Ok(response
                    .map(|body| Body::new(RecoveringBody::new(body, recovery, head)))),
                Ok(Err(err)) => Err(err),
                Err(caught) => Ok(recovery.respond(&head, caught)),
            }
        })
    }
}

/// Response body that reports a panic raised while it streams
struct RecoveringBody {
    inner: Option<Pin<Box<Body>>>,
    recovery: Recovery,
    head: Arc<RequestHead>,
}

impl RecoveringBody {
    fn new(body: Body, recovery: Recovery, head: Arc<RequestHead>) -> Self {
        Self {
            inner: Some(Box::pin(body)),
            recovery,
            head,
        }
    }
}

impl HttpBody for RecoveringBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match region::catch_unwind(|| inner.as_mut().poll_frame(cx)) {
            Ok(Poll::Ready(None)) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Ok(poll) => poll,
            Err(caught) => {
                let panicked = this.inner.take();
                let _ = region::catch_unwind(move || drop(panicked));

                let details = this.recovery.report(&this.head, caught);
                Poll::Ready(Some(Err(axum::Error::new(details))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(true, |inner| inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner
            .as_ref()
            .map_or_else(|| SizeHint::with_exact(0), |inner| inner.size_hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use panic_recovery_common::LogSink;
    use panic_recovery_testing::capture_sink;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    async fn faulty(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
        panic!("test panic")
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_reports_method_and_path() {
        let (sink, logs) = capture_sink();
        let service = RecoverLayer::with_reporter(Reporter::new(sink)).layer(service_fn(faulty));

        let response = service.oneshot(request("/orders/42")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let details = response.extensions().get::<PanicDetails>().unwrap();
        assert_eq!(details.record().method_or_path(), "/orders/42");

        let event = logs.single();
        assert_eq!(event.field("method"), Some("/orders/42"));
        assert_eq!(event.field("http.method"), Some("POST"));
        assert_eq!(event.field("http.path"), Some("/orders/42"));
    }

    #[tokio::test]
    async fn test_handler_panic_falls_back_to_default() {
        let (sink, logs) = capture_sink();
        let service = RecoverLayer::with_reporter(Reporter::new(sink))
            .with_handler(|_head, _fault| panic!("handler panic"))
            .layer(service_fn(faulty));

        let response = service.oneshot(request("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(logs.single().field("fault"), Some("handler panic"));
    }

    #[tokio::test]
    async fn test_details_can_be_disabled() {
        let service = RecoverLayer::with_reporter(Reporter::new(LogSink::noop()))
            .attach_details(false)
            .layer(service_fn(faulty));

        let response = service.oneshot(request("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<PanicDetails>().is_none());
    }

    #[test]
    fn test_request_head_reads_connect_info() {
        let addr: SocketAddr = "10.0.0.7:4242".parse().unwrap();
        let mut req = request("/status?verbose=1");
        req.extensions_mut().insert(ConnectInfo(addr));

        let head = RequestHead::capture(&req);

        assert_eq!(head.path(), "/status");
        assert_eq!(head.method, Method::POST);
        assert_eq!(head.remote_addr, Some(addr));
    }
}

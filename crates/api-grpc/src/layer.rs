//! Tower layer recovering every method of a tonic server.
//!
//! ```rust,no_run
//! use panic_recovery_grpc::GrpcRecoveryLayer;
//! use tonic::transport::Server;
//!
//! let builder = Server::builder().layer(GrpcRecoveryLayer::new());
//! ```
//!
//! Works at the HTTP level, so unary and streaming methods are handled alike:
//! a panic while the service future runs (unary handlers, streaming setup)
//! becomes a trailers-only response with `grpc-status: 13`; a panic while the
//! response body is polled (message production) ends the body with the same
//! status in its trailers. The method identifier is the request path.

use crate::interceptors::RecoveryPolicy;
use futures::future::BoxFuture;
use http::{header, HeaderMap, HeaderValue};
use http_body::{Body, Frame, SizeHint};
use panic_recovery_application::{region, CaughtPanic, Reporter};
use panic_recovery_common::RecoveryConfig;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::transport::server::TcpConnectInfo;
use tonic::Status;
use tower::{Layer, Service};

const GRPC_CONTENT_TYPE: &str = "application/grpc";
const GRPC_STATUS_HEADER: &str = "grpc-status";
const GRPC_STATUS_INTERNAL: &str = "13";

/// Layer for panic recovery
#[derive(Debug, Clone)]
pub struct GrpcRecoveryLayer {
    policy: RecoveryPolicy,
}

impl GrpcRecoveryLayer {
    /// Create a layer logging to the process-wide sink
    pub fn new() -> Self {
        Self::with_reporter(Reporter::global())
    }

    /// Create a layer logging through `reporter`
    pub fn with_reporter(reporter: Reporter) -> Self {
        Self {
            policy: RecoveryPolicy::new(reporter),
        }
    }

    /// Create a layer from the host's configuration
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            policy: RecoveryPolicy::from_config(config),
        }
    }

    /// Whether recovered responses carry `PanicDetails` in their extensions
    pub fn attach_details(mut self, attach: bool) -> Self {
        self.policy.set_attach_details(attach);
        self
    }
}

impl Default for GrpcRecoveryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for GrpcRecoveryLayer {
    type Service = GrpcRecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcRecoveryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service that performs panic recovery
#[derive(Debug, Clone)]
pub struct GrpcRecoveryService<S> {
    inner: S,
    policy: RecoveryPolicy,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for GrpcRecoveryService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Body + Send + 'static,
{
    type Response = http::Response<RecoveringBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let policy = self.policy.clone();
        let method: Arc<str> = Arc::from(req.uri().path());
        let remote_addr = req
            .extensions()
            .get::<TcpConnectInfo>()
            .and_then(TcpConnectInfo::remote_addr);

        // The clone goes back into `self`; the instance that was driven to
        // readiness serves this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let future = match region::catch_unwind(move || inner.call(req)) {
            Ok(future) => future,
            Err(caught) => {
                let response = trailers_only(&policy, caught, &method, remote_addr);
                return Box::pin(async move { Ok(response) });
            }
        };

        Box::pin(async move {
            match region::guard(future).await {
                Ok(Ok(response)) => Ok(response
                    .map(|body| RecoveringBody::new(body, policy, method, remote_addr))),
                Ok(Err(err)) => Err(err),
                Err(caught) => Ok(trailers_only(&policy, caught, &method, remote_addr)),
            }
        })
    }
}

fn trailers_only<B>(
    policy: &RecoveryPolicy,
    caught: CaughtPanic,
    method: &str,
    remote_addr: Option<SocketAddr>,
) -> http::Response<RecoveringBody<B>> {
    let details = policy.report(caught, method, remote_addr);
    let status = policy.status(&details);

    let mut response = http::Response::new(RecoveringBody::empty());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(GRPC_CONTENT_TYPE),
    );
    write_status(&status, response.headers_mut());

    if policy.attach_details() {
        response.extensions_mut().insert(details);
    }

    response
}

fn write_status(status: &Status, headers: &mut HeaderMap) {
    if status.add_header(headers).is_err() {
        headers.insert(
            GRPC_STATUS_HEADER,
            HeaderValue::from_static(GRPC_STATUS_INTERNAL),
        );
    }
}

struct BodyContext {
    policy: RecoveryPolicy,
    method: Arc<str>,
    remote_addr: Option<SocketAddr>,
}

/// Response body that ends with `grpc-status: 13` trailers when polling it panics
pub struct RecoveringBody<B> {
    inner: Option<Pin<Box<B>>>,
    context: Option<BodyContext>,
}

impl<B> RecoveringBody<B> {
    fn new(
        body: B,
        policy: RecoveryPolicy,
        method: Arc<str>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            inner: Some(Box::pin(body)),
            context: Some(BodyContext {
                policy,
                method,
                remote_addr,
            }),
        }
    }

    /// A body with no frames
    pub fn empty() -> Self {
        Self {
            inner: None,
            context: None,
        }
    }
}

impl<B> Body for RecoveringBody<B>
where
    B: Body,
{
    type Data = B::Data;
    type Error = B::Error;

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

                let mut trailers = HeaderMap::new();
                match &this.context {
                    Some(context) => {
                        let details =
                            context
                                .policy
                                .report(caught, &context.method, context.remote_addr);
                        write_status(&context.policy.status(&details), &mut trailers);
                    }
                    None => write_status(&Status::internal("panic occurred"), &mut trailers),
                }
                Poll::Ready(Some(Ok(Frame::trailers(trailers))))
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

impl<B> Default for RecoveringBody<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<B> std::fmt::Debug for RecoveringBody<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveringBody")
            .field("finished", &self.inner.is_none())
            .finish()
    }
}

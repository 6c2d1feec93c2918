//! Recovery for streaming handlers
//!
//! A streaming call can panic in two places: while the handler sets the call
//! up, or while the response stream produces a message. The first fails the
//! call with an `Internal` status. The second ends the stream with one
//! `Internal` status item; the panicked stream is dropped and nothing more is
//! sent.

use super::{RecoveryPolicy, StreamServerInfo};
use futures::stream::{FusedStream, Stream};
use panic_recovery_application::{region, Reporter};
use panic_recovery_common::RecoveryConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::{Request, Response, Status};

/// Streaming interceptor
#[derive(Debug, Clone)]
pub struct StreamRecoveryInterceptor {
    policy: RecoveryPolicy,
}

impl StreamRecoveryInterceptor {
    /// Create an interceptor logging to the process-wide sink
    pub fn new() -> Self {
        Self::with_reporter(Reporter::global())
    }

    /// Create an interceptor logging through `reporter`
    pub fn with_reporter(reporter: Reporter) -> Self {
        Self {
            policy: RecoveryPolicy::new(reporter),
        }
    }

    /// Create an interceptor from the host's configuration
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            policy: RecoveryPolicy::from_config(config),
        }
    }

    /// Whether terminal statuses carry the diagnostic record as their source
    pub fn attach_details(mut self, attach: bool) -> Self {
        self.policy.set_attach_details(attach);
        self
    }

    /// Run `handler` for `request` and guard the stream it returns.
    ///
    /// Use [`RecoveringStream<S>`] as the service's associated stream type.
    pub async fn intercept<Req, S, T, H, Fut>(
        &self,
        info: &StreamServerInfo,
        request: Request<Req>,
        handler: H,
    ) -> Result<Response<RecoveringStream<S>>, Status>
    where
        H: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<S>, Status>>,
        S: Stream<Item = Result<T, Status>>,
    {
        let remote_addr = request.remote_addr();
        let method: Arc<str> = Arc::from(info.full_method.as_str());

        match region::guard(async move { handler(request).await }).await {
            Ok(Ok(response)) => {
                let (metadata, stream, extensions) = response.into_parts();
                let stream =
                    RecoveringStream::new(stream, self.policy.clone(), method, remote_addr);
                Ok(Response::from_parts(metadata, stream, extensions))
            }
            Ok(Err(status)) => Err(status),
            Err(caught) => Err(self.policy.recover(caught, &method, remote_addr)),
        }
    }
}

impl Default for StreamRecoveryInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Response stream that ends with an `Internal` status when polling it panics
pub struct RecoveringStream<S> {
    inner: Option<Pin<Box<S>>>,
    policy: RecoveryPolicy,
    method: Arc<str>,
    remote_addr: Option<SocketAddr>,
}

impl<S> RecoveringStream<S> {
    fn new(
        stream: S,
        policy: RecoveryPolicy,
        method: Arc<str>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
            policy,
            method,
            remote_addr,
        }
    }
}

impl<S, T> Stream for RecoveringStream<S>
where
    S: Stream<Item = Result<T, Status>>,
{
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match region::catch_unwind(|| inner.as_mut().poll_next(cx)) {
            Ok(Poll::Ready(None)) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Ok(poll) => poll,
            Err(caught) => {
                let panicked = this.inner.take();
                let _ = region::catch_unwind(move || drop(panicked));
                let status = this.policy.recover(caught, &this.method, this.remote_addr);
                Poll::Ready(Some(Err(status)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            // One extra item if the stream panics.
            Some(inner) => {
                let (lower, upper) = inner.size_hint();
                (lower, upper.and_then(|upper| upper.checked_add(1)))
            }
            None => (0, Some(0)),
        }
    }
}

impl<S, T> FusedStream for RecoveringStream<S>
where
    S: Stream<Item = Result<T, Status>>,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl<S> std::fmt::Debug for RecoveringStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveringStream")
            .field("method", &self.method)
            .field("terminated", &self.inner.is_none())
            .finish()
    }
}

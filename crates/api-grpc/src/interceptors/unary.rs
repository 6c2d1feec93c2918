//! Recovery for unary handlers

use super::{RecoveryPolicy, UnaryServerInfo};
use panic_recovery_application::{region, Reporter};
use panic_recovery_common::RecoveryConfig;
use std::future::Future;
use tonic::{Request, Response, Status};

/// Unary interceptor converting a handler panic into an `Internal` status.
///
/// ```rust
/// use panic_recovery_application::Reporter;
/// use panic_recovery_common::LogSink;
/// use panic_recovery_grpc::interceptors::{UnaryRecoveryInterceptor, UnaryServerInfo};
/// use tonic::{Code, Request, Response, Status};
///
/// async fn faulty(_req: Request<&'static str>) -> Result<Response<String>, Status> {
///     panic!("test panic")
/// }
///
/// # futures::executor::block_on(async {
/// let interceptor = UnaryRecoveryInterceptor::with_reporter(Reporter::new(LogSink::noop()));
/// let info = UnaryServerInfo::new("/echo.Echo/UnaryEcho");
///
/// let status = interceptor
///     .intercept(&info, Request::new("ping"), faulty)
///     .await
///     .unwrap_err();
///
/// assert_eq!(status.code(), Code::Internal);
/// assert_eq!(status.message(), "panic occurred: test panic");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct UnaryRecoveryInterceptor {
    policy: RecoveryPolicy,
}

impl UnaryRecoveryInterceptor {
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

    /// Whether the returned status carries the diagnostic record as its source
    pub fn attach_details(mut self, attach: bool) -> Self {
        self.policy.set_attach_details(attach);
        self
    }

    /// Run `handler` for `request`, recovering from a panic.
    ///
    /// Without a panic the handler's result is returned untouched.
    pub async fn intercept<Req, Resp, H, Fut>(
        &self,
        info: &UnaryServerInfo,
        request: Request<Req>,
        handler: H,
    ) -> Result<Response<Resp>, Status>
    where
        H: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<Resp>, Status>>,
    {
        let remote_addr = request.remote_addr();

        match region::guard(async move { handler(request).await }).await {
            Ok(result) => result,
            Err(caught) => Err(self.policy.recover(caught, &info.full_method, remote_addr)),
        }
    }
}

impl Default for UnaryRecoveryInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

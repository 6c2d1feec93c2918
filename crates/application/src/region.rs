//! Recovery regions.
//!
//! A recovery region runs a closure, or every poll of a future, under
//! `std::panic::catch_unwind`. By the time `catch_unwind` returns, the
//! panicking stack is gone, so the stack trace is taken earlier: a panic hook
//! installed once per process records a backtrace and the panic location in a
//! thread-local slot whenever the panicking thread is inside a region. The
//! boundary then picks that capture up together with the payload.
//!
//! Panics outside any region reach the previously installed hook untouched.

use panic_recovery_domain::{Fault, StackTrace};
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::task::{Context, Poll};

/// Frame recorded when neither a backtrace nor a panic location is available
pub const BOUNDARY_FRAME: &str = "<recovery boundary>";

static HOOK_INSTALLED: Once = Once::new();
static FORWARD_TO_PREVIOUS: AtomicBool = AtomicBool::new(false);
static HOOK_CONFIGURED: Once = Once::new();

thread_local! {
    static REGION_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_CAPTURE: RefCell<Option<HookCapture>> = const { RefCell::new(None) };
}

struct HookCapture {
    stack: StackTrace,
    location: Option<String>,
}

/// A panic caught at a recovery boundary
#[derive(Debug, Clone)]
pub struct CaughtPanic {
    /// The classified payload
    pub fault: Fault,
    /// Stack of the panicking thread
    pub stack: StackTrace,
    /// `file:line:column` of the `panic!` call, when known
    pub location: Option<String>,
}

impl CaughtPanic {
    fn from_payload(payload: Box<dyn std::any::Any + Send + 'static>) -> Self {
        let fault = Fault::from_payload(payload);
        let capture = LAST_CAPTURE
            .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
            .ok()
            .flatten();

        match capture {
            Some(HookCapture { stack, location }) => {
                let stack = if stack.is_empty() {
                    fallback_stack(location.as_deref())
                } else {
                    stack
                };
                Self {
                    fault,
                    stack,
                    location,
                }
            }
            // The hook was replaced after installation; the boundary's own
            // stack is the best remaining evidence.
            None => {
                let stack = StackTrace::from_backtrace(&Backtrace::force_capture());
                let stack = if stack.is_empty() {
                    fallback_stack(None)
                } else {
                    stack
                };
                Self {
                    fault,
                    stack,
                    location: None,
                }
            }
        }
    }
}

fn fallback_stack(location: Option<&str>) -> StackTrace {
    StackTrace::single(location.unwrap_or(BOUNDARY_FRAME))
}

/// Install the capturing panic hook. Safe to call multiple times.
///
/// Every region entry calls this, so explicit installation is only needed to
/// control ordering relative to other hooks the host installs.
pub fn install_panic_hook() {
    HOOK_INSTALLED.call_once(|| {
        let previous = panic::take_hook();

        panic::set_hook(Box::new(move |info| {
            if !in_region() {
                previous(info);
                return;
            }

            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            let stack = StackTrace::from_backtrace(&Backtrace::force_capture());

            let _ = LAST_CAPTURE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(HookCapture { stack, location });
                }
            });

            if FORWARD_TO_PREVIOUS.load(Ordering::Relaxed) {
                previous(info);
            }
        }));
    });
}

/// Whether panics inside regions also reach the previous hook.
///
/// Overrides the setting unconditionally; see [`configure_panic_hook`].
pub fn set_forward_to_previous_hook(forward: bool) {
    FORWARD_TO_PREVIOUS.store(forward, Ordering::Relaxed);
}

/// Apply the configured hook setting once per process.
///
/// The first call wins, as with the global log sink: layers built later from
/// a different configuration do not change it.
pub fn configure_panic_hook(forward_to_previous: bool) {
    HOOK_CONFIGURED.call_once(|| set_forward_to_previous_hook(forward_to_previous));
}

/// Current hook setting
pub fn forwards_to_previous_hook() -> bool {
    FORWARD_TO_PREVIOUS.load(Ordering::Relaxed)
}

/// Whether the current thread is executing inside a recovery region
pub fn in_region() -> bool {
    REGION_DEPTH.try_with(|depth| depth.get() > 0).unwrap_or(false)
}

struct RegionGuard;

impl RegionGuard {
    fn enter() -> Self {
        let _ = REGION_DEPTH.try_with(|depth| depth.set(depth.get() + 1));
        RegionGuard
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        let remaining = REGION_DEPTH
            .try_with(|depth| {
                let remaining = depth.get().saturating_sub(1);
                depth.set(remaining);
                remaining
            })
            .unwrap_or(0);

        // A panic caught by the handler's own `catch_unwind` leaves its capture
        // behind; it must not be attributed to a later panic.
        if remaining == 0 {
            let _ = LAST_CAPTURE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    slot.take();
                }
            });
        }
    }
}

/// Run `f`, converting a panic into [`CaughtPanic`].
pub fn catch_unwind<T>(f: impl FnOnce() -> T) -> Result<T, CaughtPanic> {
    install_panic_hook();
    let guard = RegionGuard::enter();
    let result = panic::catch_unwind(AssertUnwindSafe(f)).map_err(CaughtPanic::from_payload);
    drop(guard);
    result
}

/// Future returned by [`guard`]
#[must_use = "futures do nothing unless polled"]
pub struct Guarded<F> {
    inner: Option<Pin<Box<F>>>,
}

/// Run every poll of `future` inside a recovery region.
///
/// The first panic completes the returned future with `Err`. The panicked
/// future is dropped inside a region and never polled again; like
/// `futures::future::Fuse`, polling after completion returns `Pending`.
pub fn guard<F: Future>(future: F) -> Guarded<F> {
    Guarded {
        inner: Some(Box::pin(future)),
    }
}

impl<F: Future> Future for Guarded<F> {
    type Output = Result<F::Output, CaughtPanic>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Pending;
        };

        match catch_unwind(|| inner.as_mut().poll(cx)) {
            Ok(Poll::Ready(output)) => {
                this.inner = None;
                Poll::Ready(Ok(output))
            }
            Ok(Poll::Pending) => Poll::Pending,
            Err(caught) => {
                let panicked = this.inner.take();
                // A destructor may panic too; that panic belongs to this fault.
                let _ = catch_unwind(move || drop(panicked));
                Poll::Ready(Err(caught))
            }
        }
    }
}

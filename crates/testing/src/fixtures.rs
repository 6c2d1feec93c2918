//! Handlers and strategies that exercise the recovery boundary.

use futures::stream::{self, Stream, StreamExt};
use panic_recovery_domain::{DiagnosticRecord, Fault, StackTrace};
use proptest::prelude::*;
use std::time::SystemTime;

/// Message carried by every fixture panic
pub const TEST_PANIC: &str = "test panic";

/// A diagnostic record for `message` raised while serving `method_or_path`
pub fn sample_record(message: &str, method_or_path: &str) -> DiagnosticRecord {
    DiagnosticRecord::new(
        Fault::from(message),
        StackTrace::single("fixtures::handler at src/fixtures.rs:1:1"),
        method_or_path,
        SystemTime::now().into(),
    )
}

/// A stream yielding `Ok(0)`, `Ok(1)`, ... and panicking with [`TEST_PANIC`]
/// when item `panic_at` is requested
pub fn panicking_stream<E>(panic_at: usize) -> impl Stream<Item = Result<usize, E>> + Send + 'static
where
    E: Send + 'static,
{
    stream::iter(0..).map(move |i| {
        if i == panic_at {
            panic!("{}", TEST_PANIC);
        }
        Ok(i)
    })
}

/// A finite stream that never panics
pub fn counting_stream<E>(len: usize) -> impl Stream<Item = Result<usize, E>> + Send + 'static
where
    E: Send + 'static,
{
    stream::iter((0..len).map(Ok))
}

/// Arbitrary panic messages, including empty and non-ASCII ones
pub fn panic_message_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just(TEST_PANIC.to_string()),
        "\\PC{0,64}",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_stream_is_finite() {
        let items: Vec<Result<usize, ()>> = futures::executor::block_on(counting_stream(3).collect());
        assert_eq!(items, vec![Ok(0), Ok(1), Ok(2)]);
    }

    #[test]
    fn test_panicking_stream_yields_prefix() {
        let items: Vec<Result<usize, ()>> =
            futures::executor::block_on(panicking_stream(5).take(2).collect());
        assert_eq!(items, vec![Ok(0), Ok(1)]);
    }
}

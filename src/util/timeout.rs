//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How a bounded future ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Bounded<T> {
    Completed(T),
    TimedOut(Duration),
    Cancelled,
}

/// Run `future` until it completes, `duration` elapses, or `cancel` fires.
///
/// The future is dropped on timeout or cancellation.
pub async fn run_bounded<T>(
    duration: Duration,
    cancel: &CancellationToken,
    future: impl Future<Output = T>,
) -> Bounded<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        result = tokio::time::timeout(duration, future) => match result {
            Ok(value) => Bounded::Completed(value),
            Err(_) => Bounded::TimedOut(duration),
        },
    }
}

//! Cancellable timer shared by every per-task probe.
//!
//! An operation, its deadline and the run's abort token race inside one
//! `tokio::select!`. Exactly one arm settles the operation; the losing arms
//! are dropped with it, so a deadline that would fire after completion never
//! runs.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How a timed operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    Completed(T),
    TimedOut,
    Aborted,
}

impl<T> Settled<T> {
    /// Returns the completed value, if any
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::TimedOut | Self::Aborted => None,
        }
    }

    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Runs `operation` until it completes, `duration` elapses, or `abort` fires.
///
/// An already-cancelled token wins before the operation is polled.
pub async fn settle_within<F>(duration: Duration, abort: &CancellationToken, operation: F) -> Settled<F::Output>
where
    F: Future,
{
    if abort.is_cancelled() {
        return Settled::Aborted;
    }

    tokio::select! {
        biased;
        () = abort.cancelled() => Settled::Aborted,
        value = operation => Settled::Completed(value),
        () = tokio::time::sleep(duration) => Settled::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let token = CancellationToken::new();
        let result = settle_within(Duration::from_secs(5), &token, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;
        assert_eq!(result, Settled::Completed(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let token = CancellationToken::new();
        let result = settle_within(Duration::from_secs(1), &token, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        })
        .await;
        assert!(result.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_wins_over_pending_operation() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let result = settle_within(Duration::from_secs(60), &token, std::future::pending::<()>()).await;
        assert_eq!(result, Settled::Aborted);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result = settle_within(Duration::from_secs(1), &token, async { 1 }).await;
        assert_eq!(result, Settled::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_deadline_does_not_resettle() {
        let token = CancellationToken::new();
        let result = settle_within(Duration::from_millis(10), &token, async { "done" }).await;
        // Advancing past the deadline after completion has nothing left to fire.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(result.completed(), Some("done"));
    }
}

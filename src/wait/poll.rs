// src/wait/poll.rs

//! Bounded polling with cancellation.
//!
//! Every wait in the runner goes through [`poll_until`]: check a condition,
//! sleep for an interval, repeat until the condition is met, the check fails
//! fatally, the timeout elapses, or the cancellation token fires.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{Result, RunnerError};

/// Interval and bound of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Check before the first sleep.
    pub immediate: bool,
}

impl PollPolicy {
    /// Check right away, then every `interval`.
    pub const fn immediate(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: true,
        }
    }

    /// Sleep one `interval` before the first check.
    pub const fn delayed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: false,
        }
    }
}

/// Result of a single non-fatal check.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Condition met; stop polling.
    Done(T),
    /// Not yet. The reason is logged and reported if the wait times out.
    Pending(String),
}

/// Poll `check` under `policy` until it returns [`Attempt::Done`].
///
/// - `Err` from `check` aborts immediately and is returned as is.
/// - If the timeout elapses, returns [`RunnerError::Timeout`] carrying the
///   last pending reason.
/// - If `cancel` fires, returns [`RunnerError::Cancelled`] without waiting
///   for the current interval to finish.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut last: Option<String> = None;

    if !policy.immediate {
        pause(cancel, policy.interval.min(policy.timeout)).await?;
    }

    loop {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        match check().await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Pending(reason) => {
                debug!(what, %reason, "condition not met yet");
                last = Some(reason);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(RunnerError::Timeout {
                what: what.to_string(),
                elapsed_secs: (now - start).as_secs(),
                last,
            });
        }

        pause(cancel, policy.interval.min(deadline - now)).await?;
    }
}

async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        _ = sleep(duration) => Ok(()),
    }
}

/// How many polls a pod may spend pending before the wait gives up, even if
/// the outer timeout still has time left.
pub const POD_PENDING_LIMIT: u32 = 20;

/// Counts pending observations of a pod across polls.
#[derive(Debug)]
pub struct PendingBudget {
    limit: u32,
    seen: AtomicU32,
}

impl PendingBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            seen: AtomicU32::new(0),
        }
    }

    /// Record one more pending poll; errors once the count exceeds the limit.
    pub fn tick(&self, pod: &str) -> Result<()> {
        let polls = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if polls > self.limit {
            return Err(RunnerError::PendingTimeout {
                pod: pod.to_string(),
                polls,
            });
        }
        Ok(())
    }

    pub fn seen(&self) -> u32 {
        self.seen.load(Ordering::Relaxed)
    }
}

impl Default for PendingBudget {
    fn default() -> Self {
        Self::new(POD_PENDING_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const FIVE: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn returns_value_once_done() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let value = poll_until(
            PollPolicy::immediate(FIVE, Duration::from_secs(30)),
            &cancel,
            "thing",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(Attempt::Pending(format!("attempt {n}")))
                    } else {
                        Ok(Attempt::Done(n))
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_reason() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let err = poll_until::<(), _, _>(
            PollPolicy::immediate(FIVE, Duration::from_secs(30)),
            &cancel,
            "config map",
            || async { Ok(Attempt::Pending("not found".to_string())) },
        )
        .await
        .unwrap_err();

        match err {
            RunnerError::Timeout { what, last, .. } => {
                assert_eq!(what, "config map");
                assert_eq!(last.as_deref(), Some("not found"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(Instant::now() - start >= Duration::from_secs(30));
        assert!(Instant::now() - start < Duration::from_secs(36));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_polling() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let err = poll_until::<(), _, _>(
            PollPolicy::immediate(FIVE, Duration::from_secs(60)),
            &cancel,
            "pod",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RunnerError::Cluster("forbidden".into())) }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::Cluster(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poll_until::<(), _, _>(
            PollPolicy::immediate(FIVE, Duration::from_secs(600)),
            &cancel,
            "endpoint",
            || async { Ok(Attempt::Pending("no addresses".into())) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::Cancelled));
        assert!(Instant::now() - start < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_policy_sleeps_before_first_check() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        poll_until(
            PollPolicy::delayed(Duration::from_secs(15), Duration::from_secs(60)),
            &cancel,
            "endpoint",
            || async { Ok(Attempt::Done(())) },
        )
        .await
        .unwrap();

        assert!(Instant::now() - start >= Duration::from_secs(15));
    }

    #[test]
    fn pending_budget_allows_exactly_the_limit() {
        let budget = PendingBudget::new(3);
        for _ in 0..3 {
            budget.tick("p").unwrap();
        }
        let err = budget.tick("p").unwrap_err();
        assert!(matches!(err, RunnerError::PendingTimeout { polls: 4, .. }));
    }
}

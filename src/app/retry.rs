use std::{future::Future, time::Duration};

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffShape {
    Constant,
    Exponential {
        multiplier: u32,
        max_interval: Duration,
    },
}

/// Delay schedule between attempts, bounded by a total retry window.
///
/// An attempt is only scheduled when it would start within the window, so the
/// number of attempts is always finite regardless of the shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    interval: Duration,
    window: Duration,
    shape: BackoffShape,
    jitter: bool,
}

impl BackoffPolicy {
    pub fn constant(interval: Duration, window: Duration) -> Self {
        Self {
            interval,
            window,
            shape: BackoffShape::Constant,
            jitter: false,
        }
    }

    pub fn exponential(
        interval: Duration,
        window: Duration,
        multiplier: u32,
        max_interval: Duration,
    ) -> Self {
        Self {
            interval,
            window,
            shape: BackoffShape::Exponential {
                multiplier,
                max_interval,
            },
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn shape(&self) -> BackoffShape {
        self.shape
    }

    /// Nominal delay after the given failed attempt (1-based), before jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.shape {
            BackoffShape::Constant => self.interval,
            BackoffShape::Exponential {
                multiplier,
                max_interval,
            } => {
                let factor = multiplier.max(1).saturating_pow(attempt.saturating_sub(1));
                self.interval
                    .saturating_mul(factor)
                    .min(max_interval.max(self.interval))
            }
        }
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_after(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        // uniformly within [delay / 2, delay]
        let half = delay / 2;
        half.saturating_add(half.mul_f64(rand::rng().random_range(0.0..=1.0)))
    }
}

#[derive(Debug, PartialEq)]
pub enum RetryOutcome<T> {
    /// The operation produced a value that is not retryable.
    Ready { value: T, attempts: u32 },
    /// The window ran out while the operation kept asking for a retry.
    Exhausted { last: T, attempts: u32 },
    /// The token was cancelled before a non-retryable value was produced.
    Cancelled { last: Option<T>, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Ready { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Runs `operation` until `is_retryable` rejects its output, the policy window
/// is exhausted, or `cancel` fires. Both the operation and the sleeps between
/// attempts are raced against the token.
pub async fn retry_until<T, F, Fut, P>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    is_retryable: P,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();
    let mut attempts = 0;
    let mut last = None;

    loop {
        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { last, attempts },
            value = operation() => value,
        };
        attempts += 1;

        if !is_retryable(&value) {
            return RetryOutcome::Ready { value, attempts };
        }

        let delay = policy.next_delay(attempts);
        if started.elapsed().saturating_add(delay) > policy.window {
            return RetryOutcome::Exhausted {
                last: value,
                attempts,
            };
        }
        last = Some(value);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { last, attempts },
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::{BackoffPolicy, RetryOutcome, retry_until};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn it_stops_at_the_first_non_retryable_value() {
        let policy = BackoffPolicy::constant(secs(5), secs(60));
        let mut calls = 0;

        let outcome = retry_until(
            &policy,
            &CancellationToken::new(),
            || {
                calls += 1;
                let n = calls;
                async move { n }
            },
            |n| *n < 3,
        )
        .await;

        assert_eq!(
            outcome,
            RetryOutcome::Ready {
                value: 3,
                attempts: 3
            }
        );
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn it_gives_up_when_the_window_is_exhausted() {
        let policy = BackoffPolicy::constant(secs(5), secs(15));
        let started = Instant::now();

        let outcome = retry_until(&policy, &CancellationToken::new(), || async { () }, |_| true).await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 4, .. }));
        assert_eq!(started.elapsed(), secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn the_reference_policy_makes_a_bounded_number_of_attempts() {
        let policy = BackoffPolicy::constant(secs(5), secs(60));

        let outcome = retry_until(&policy, &CancellationToken::new(), || async {}, |_| true).await;

        assert_eq!(outcome.attempts(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn it_stops_sleeping_when_cancelled() {
        let policy = BackoffPolicy::constant(secs(5), secs(60));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(secs(7)).await;
                cancel.cancel();
            })
        };

        let outcome = retry_until(&policy, &cancel, || async { "pending" }, |_| true).await;
        canceller.await.unwrap();

        assert_eq!(
            outcome,
            RetryOutcome::Cancelled {
                last: Some("pending"),
                attempts: 2
            }
        );
        assert_eq!(started.elapsed(), secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn it_does_not_run_the_operation_when_already_cancelled() {
        let policy = BackoffPolicy::constant(secs(5), secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;

        let outcome = retry_until(
            &policy,
            &cancel,
            || {
                calls += 1;
                async {}
            },
            |_| true,
        )
        .await;

        assert_eq!(
            outcome,
            RetryOutcome::Cancelled {
                last: None,
                attempts: 0
            }
        );
        assert_eq!(calls, 0);
    }

    #[rstest]
    #[case(1, 5)]
    #[case(2, 10)]
    #[case(3, 20)]
    #[case(4, 30)]
    #[case(40, 30)]
    fn exponential_delays_grow_up_to_the_cap(#[case] attempt: u32, #[case] expected_secs: u64) {
        let policy = BackoffPolicy::exponential(secs(5), secs(120), 2, secs(30));

        assert_eq!(policy.delay_after(attempt), secs(expected_secs));
    }

    #[test]
    fn jittered_delays_stay_within_half_and_full_delay() {
        let policy = BackoffPolicy::constant(secs(4), secs(60)).with_jitter(true);

        for attempt in 1..50 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= secs(2) && delay <= secs(4), "{delay:?}");
        }
    }

    #[rstest]
    #[case::constant(BackoffPolicy::constant(Duration::MAX, secs(60)))]
    #[case::jittered(BackoffPolicy::constant(Duration::MAX, secs(60)).with_jitter(true))]
    #[case::exponential(BackoffPolicy::exponential(
        secs(u64::MAX),
        secs(60),
        u32::MAX,
        secs(u64::MAX)
    ))]
    #[tokio::test(start_paused = true)]
    async fn huge_delays_exhaust_the_window_instead_of_overflowing(#[case] policy: BackoffPolicy) {
        let outcome = retry_until(
            &policy,
            &CancellationToken::new(),
            || async {
                tokio::time::sleep(secs(1)).await;
                "pending"
            },
            |_| true,
        )
        .await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                last: "pending",
                attempts: 1
            }
        );
    }
}

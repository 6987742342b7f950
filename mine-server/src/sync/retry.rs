//! Generic retry executor with exponential backoff
//!
//! Wraps any fallible async operation. The caller supplies the
//! retryable/permanent classification; the executor never swallows a
//! final failure.

use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (1 = exactly one attempt, no delay)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each retry
    pub base_delay: Duration,
    /// Upper bound on a single delay
    pub max_delay: Duration,
    /// Jitter the sleep uniformly within [delay/2, delay]
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay after a failed `attempt` (1-based): base * 2^(attempt-1), capped
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn sleep_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_after(attempt);
        if !self.jitter {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        if millis == 0 {
            return delay;
        }
        use rand::Rng;
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }
}

/// Run `op` under `policy`, retrying failures that `is_retryable` accepts
///
/// - Success returns immediately.
/// - A non-retryable error propagates immediately without consuming the
///   remaining attempts.
/// - Retryable errors sleep `base_delay * 2^(attempt-1)` (capped, jittered
///   if configured) and retry; the sleep is a suspension point and never
///   blocks unrelated tasks.
/// - The final error is always propagated to the caller.
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.sleep_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("loop returns on the final attempt")
}

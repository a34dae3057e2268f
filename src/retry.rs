use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Exponential back-off for any fallible async operation.
///
/// Rate-limit failures back off on a steeper curve
/// (`base × 5^attempt`) than other transient failures (`base × 2^attempt`).
/// The outcome is always returned, never raised: callers branch on
/// [`RetryOutcome`] explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts:  u32,
    pub base_delay_ms: u64,
    /// Upper bound on a single wait. `None` = uncapped.
    pub max_delay_ms:  Option<u64>,
}

/// Result of a retried operation.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { last_error: String, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::oracle()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms:  Some(60_000),
        }
    }

    /// Budget for oracle calls: 3 attempts, 1s base.
    pub fn oracle() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }

    /// Budget for tool bodies: 2 attempts, 500ms base.
    pub fn tool() -> Self {
        Self::new(2, Duration::from_millis(500))
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay_ms = max_delay.map(|d| d.as_millis() as u64);
        self
    }

    pub fn is_rate_limit_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("rate_limit")
            || lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
    }

    /// Wait before the attempt following failed attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32, err: &str) -> Duration {
        let factor: u64 = if Self::is_rate_limit_error(err) { 5 } else { 2 };
        let mut ms = self.base_delay_ms.saturating_mul(factor.saturating_pow(attempt));
        if let Some(cap) = self.max_delay_ms {
            ms = ms.min(cap);
        }
        Duration::from_millis(ms)
    }

    pub async fn attempt<T, E, F, Fut>(&self, op: F) -> RetryOutcome<T>
    where
        F:   FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E:   Display,
    {
        self.attempt_notify(op, |_, _, _| {}).await
    }

    /// Like [`attempt`](Self::attempt), calling `on_retry(attempt, wait, error)`
    /// before every back-off sleep.
    pub async fn attempt_notify<T, E, F, Fut, N>(&self, mut op: F, mut on_retry: N) -> RetryOutcome<T>
    where
        F:   FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E:   Display,
        N:   FnMut(u32, Duration, &str),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match op().await {
                Ok(value) => return RetryOutcome::Succeeded { value, attempts: attempt + 1 },
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < max_attempts {
                        let wait = self.delay_for(attempt, &last_error);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max     = max_attempts,
                            wait_ms = wait.as_millis() as u64,
                            rate_limited = Self::is_rate_limit_error(&last_error),
                            error   = %last_error,
                            "transient error, retrying"
                        );
                        on_retry(attempt + 1, wait, &last_error);
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        tracing::error!(attempts = max_attempts, error = %last_error, "retries exhausted");
        RetryOutcome::Exhausted { last_error, attempts: max_attempts }
    }
}

/// Retry `op` up to `max_attempts` times starting from `base_delay`.
pub async fn attempt<T, E, F, Fut>(op: F, max_attempts: u32, base_delay: Duration) -> RetryOutcome<T>
where
    F:   FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E:   Display,
{
    RetryPolicy::new(max_attempts, base_delay).attempt(op).await
}

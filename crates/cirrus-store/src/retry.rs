//! Bounded exponential backoff for backend calls.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::backend::BackendResult;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default base increment between retries.
pub const DEFAULT_RETRY_DELTA: Duration = Duration::from_secs(2);

/// Upper bound on a single backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// How a store retries failed backend calls.
///
/// Only transient failures ([`BackendError::is_transient`](crate::backend::BackendError::is_transient))
/// are retried; everything else is returned on the first attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry up to `max_retries` times. The delay before retry `n` is
    /// `delta * (2^n - 1)` with ±20% jitter, capped at `max_backoff`.
    Exponential {
        max_retries: u32,
        delta: Duration,
        max_backoff: Duration,
    },
    /// Fail on the first error.
    NoRetry,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            max_retries: DEFAULT_MAX_RETRIES,
            delta: DEFAULT_RETRY_DELTA,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, delta: Duration) -> Self {
        Self::Exponential {
            max_retries,
            delta,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            Self::Exponential { max_retries, .. } => *max_retries,
            Self::NoRetry => 0,
        }
    }

    /// Delay before retry `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                delta, max_backoff, ..
            } => {
                let factor = 2u32
                    .checked_pow(attempt)
                    .map_or(u32::MAX, |p| p.saturating_sub(1));
                delta.saturating_mul(factor).min(*max_backoff)
            }
            Self::NoRetry => Duration::ZERO,
        }
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.8..=1.2);
        let cap = match self {
            Self::Exponential { max_backoff, .. } => *max_backoff,
            Self::NoRetry => Duration::ZERO,
        };
        base.mul_f64(factor).min(cap)
    }

    /// Run `call`, retrying transient failures per this policy.
    ///
    /// `call` is invoked again from scratch on every retry; it must reset any
    /// state (stream positions, partial output) left by the failed attempt.
    pub fn execute<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> BackendResult<T>,
    ) -> BackendResult<T> {
        let max_retries = self.max_retries();
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_retries => {
                    attempt += 1;
                    let delay = self.jittered_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient backend failure, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendErrorKind};
    use std::cell::Cell;

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_retries, Duration::ZERO)
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(2), Duration::from_secs(6));
        assert_eq!(policy.base_delay(3), Duration::from_secs(14));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(10), DEFAULT_MAX_BACKOFF);
        assert_eq!(policy.base_delay(40), DEFAULT_MAX_BACKOFF);
        for attempt in 1..=8 {
            assert!(policy.jittered_delay(attempt) <= DEFAULT_MAX_BACKOFF);
        }
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.jittered_delay(1);
            assert!(delay >= Duration::from_millis(1600), "{delay:?}");
            assert!(delay <= Duration::from_millis(2400), "{delay:?}");
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let calls = Cell::new(0);
        let result = instant(5).execute("put", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(BackendError::new(BackendErrorKind::Unavailable, "busy"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retries_are_bounded() {
        let calls = Cell::new(0);
        let result: BackendResult<()> = instant(5).execute("put", || {
            calls.set(calls.get() + 1);
            Err(BackendError::new(BackendErrorKind::Timeout, "slow"))
        });
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.get(), 6);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let calls = Cell::new(0);
        let result: BackendResult<()> = instant(5).execute("get", || {
            calls.set(calls.get() + 1);
            Err(BackendError::not_found("gone"))
        });
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn no_retry_policy_tries_once() {
        let calls = Cell::new(0);
        let _ = RetryPolicy::NoRetry.execute("get", || -> BackendResult<()> {
            calls.set(calls.get() + 1);
            Err(BackendError::new(BackendErrorKind::Unavailable, "busy"))
        });
        assert_eq!(calls.get(), 1);
    }
}

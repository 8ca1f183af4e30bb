//! Attempt-count-and-last-error retry policy.
//!
//! [`RetryPolicy::run`] drives an async operation up to `max_attempts` times,
//! sleeping between attempts, and either returns the first success (with the
//! attempt number it took) or every captured error once attempts run out.
//! Nothing about the interpretation service lives here, so the policy can be
//! tested with plain closures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// `base * 2^(retry - 1)`: 500 ms → 1 s → 2 s with a 500 ms base.
    Exponential,
}

/// A bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff: Backoff,
}

/// A successful run and how many attempts it needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    /// 1-based attempt that succeeded.
    pub attempts: u32,
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    /// Attempts made; equals the policy's `max_attempts`.
    pub attempts: u32,
    /// The error from the final attempt.
    pub last_error: E,
    /// Errors from the earlier attempts, oldest first.
    pub earlier_errors: Vec<E>,
}

impl RetryPolicy {
    /// Retries after a constant delay. `max_attempts` is clamped to ≥ 1.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Retries after an exponentially growing delay. `max_attempts` is clamped to ≥ 1.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait before 1-based `attempt`. Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let shift = (attempt - 2).min(16);
                self.base_delay.saturating_mul(1u32 << shift)
            }
        }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. `label` only shows up in logs.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<Attempted<T>, RetryExhausted<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut earlier_errors = Vec::new();
        let mut attempt = 1;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                debug!("{label}: waiting {}ms before attempt {attempt}", delay.as_millis());
                sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(e) => {
                    warn!("{label}: attempt {attempt}/{} failed: {e}", self.max_attempts);
                    if attempt >= self.max_attempts {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: e,
                            earlier_errors,
                        });
                    }
                    earlier_errors.push(e);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(500))
    }
}

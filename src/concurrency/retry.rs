// Retry with exponential backoff and jitter for network-bound operations.
//
// Wraps moderation calls and store writes. Only failures the caller's
// classifier marks as transient are retried; everything else is returned
// from the first attempt. The delay before attempt k+1 is
//
//   initial_delay * multiplier^(k-1) * (1 ± jitter_fraction)
//
// with the jitter drawn uniformly, so concurrent callers that failed
// together don't all come back at the same instant.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Ceiling on any single backoff sleep, whatever the policy computes.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Backoff parameters. All of them come from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Fraction of each delay to randomize by, 0.0 to 1.0
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(600),
            multiplier: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Jitter fraction actually applied. Anything that isn't a finite
    /// number disables jitter.
    fn jitter(&self) -> f64 {
        if self.jitter_fraction.is_finite() {
            self.jitter_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    /// (1-based), without jitter. Never more than `MAX_RETRY_DELAY`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        clamp_delay(secs)
    }

    /// Delay for `attempt` with jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter();
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        clamp_delay(base.as_secs_f64() * factor)
    }

    /// Upper bound on the total time spent sleeping between attempts.
    pub fn max_total_delay(&self) -> Duration {
        let stretch = 1.0 + self.jitter();
        (1..self.attempts()).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(clamp_delay(self.base_delay(attempt).as_secs_f64() * stretch))
        })
    }
}

/// Seconds to a `Duration` in `[0, MAX_RETRY_DELAY]`. NaN and negative
/// values become zero, overflow saturates.
fn clamp_delay(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs)
        .map(|delay| delay.min(MAX_RETRY_DELAY))
        .unwrap_or(MAX_RETRY_DELAY)
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// `should_retry` decides whether an error is worth another attempt. The last
/// error is returned unchanged when attempts are exhausted.
pub async fn with_retry<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    should_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }

                let delay = policy.jittered_delay(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying in {:.1}s",
                    delay.as_secs_f64(),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

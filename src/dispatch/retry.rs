//! Retry policy, backoff calculation, and the shared retry loop.
//!
//! The backoff for the n-th retry (0-indexed) is
//! `unit * base^n + uniform(0, 1) * unit`, capped at `max_delay` before
//! jitter is added. With the defaults (`base = 2`, `unit = 1s`) that is
//! `2^n + U(0,1)` seconds.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::Result;
use crate::telemetry;

/// Backoff configuration for transient upstream failures.
///
/// ```rust
/// # use passerelle::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .base(2.0)
///     .unit(Duration::from_millis(200))
///     .jitter(false);
/// assert_eq!(policy.delay_for_retry(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Exponential base. Default: 2.0.
    pub base: f64,
    /// Time unit the exponential and the jitter are scaled by. Default: 1s.
    pub unit: Duration,
    /// Cap on the exponential part of the delay. Default: 30s.
    pub max_delay: Duration,
    /// Whether to add `uniform(0, 1) * unit` of jitter. Default: true.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: 2.0,
            unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default backoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exponential base.
    pub fn base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    /// Set the time unit.
    pub fn unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Set the cap on the exponential delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before retry number `retry_count` (0-indexed), without jitter.
    ///
    /// `unit * base^retry_count`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.unit.as_secs_f64() * self.base.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay including jitter.
    pub fn effective_delay(&self, retry_count: u32) -> Duration {
        let delay = self.delay_for_retry(retry_count);
        if self.jitter {
            delay + self.unit.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
        } else {
            delay
        }
    }
}

/// Run `f` against one endpoint, retrying transient failures.
///
/// At most `max_attempts` calls are made (1 = no retry). Transient errors
/// (as classified by [`PasserelleError::is_transient()`](crate::PasserelleError::is_transient))
/// sleep for the policy's backoff and retry; any other error, or a transient
/// error on the last attempt, is returned to the caller so it can move on
/// to the next endpoint.
pub(crate) async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    max_attempts: u32,
    model: &str,
    endpoint: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut retry_count = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && retry_count + 1 < max_attempts => {
                let delay = policy.effective_delay(retry_count);
                metrics::counter!(telemetry::RETRIES_TOTAL, "model" => model.to_owned())
                    .increment(1);
                warn!(
                    model,
                    endpoint,
                    attempt = retry_count + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(
                        model,
                        endpoint,
                        attempts = retry_count + 1,
                        error = %e,
                        "retries exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.base, 2.0);
        assert_eq!(p.unit, Duration::from_secs(1));
        assert!(p.jitter);
    }

    #[test]
    fn exponential_delay() {
        let p = RetryPolicy::new().jitter(false);
        assert_eq!(p.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(p.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_retry(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy::new().max_delay(Duration::from_secs(5));
        assert_eq!(p.delay_for_retry(10), Duration::from_secs(5));
        assert_eq!(p.delay_for_retry(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_one_unit() {
        let p = RetryPolicy::new().unit(Duration::from_millis(10));
        for _ in 0..50 {
            let d = p.effective_delay(1);
            assert!(d >= Duration::from_millis(20));
            assert!(d < Duration::from_millis(30));
        }
    }

    #[test]
    fn no_jitter_is_exact() {
        let p = RetryPolicy::new().unit(Duration::from_millis(10)).jitter(false);
        assert_eq!(p.effective_delay(2), Duration::from_millis(40));
    }
}

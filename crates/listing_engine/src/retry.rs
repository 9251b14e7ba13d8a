use std::future::Future;
use std::time::Duration;

use crate::store::StoreError;

/// Backoff tuning for store writes.
///
/// Rate-limit failures double the wait up to `rate_limit_ceiling`; any
/// other failure multiplies it by 1.5 up to the lower `other_ceiling`.
/// A `retry_after` advised by the store raises the next wait when it is
/// longer than the computed one. `write_interval` is the mandatory pause
/// before every attempt, keeping request density below the remote's
/// quota regardless of outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_wait: Duration,
    pub rate_limit_ceiling: Duration,
    pub other_ceiling: Duration,
    pub write_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_wait: Duration::from_secs(45),
            rate_limit_ceiling: Duration::from_secs(300),
            other_ceiling: Duration::from_secs(120),
            write_interval: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy with no pauses, for tests exercising ladder logic rather
    /// than timing.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_wait: Duration::ZERO,
            rate_limit_ceiling: Duration::ZERO,
            other_ceiling: Duration::ZERO,
            write_interval: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or retries are exhausted, returning the
    /// last error. Wait times are non-decreasing up to the ceilings.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut wait = self.initial_wait;
        let mut attempt: u32 = 0;
        loop {
            tokio::time::sleep(self.write_interval).await;
            if attempt > 0 {
                log::info!(
                    "retry {attempt}/{} after waiting {:.1}s",
                    self.max_retries,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        log::error!("giving up after {} retries: {err}", self.max_retries);
                        return Err(err);
                    }
                    // The first retry waits the initial time; escalation
                    // starts with the second failure.
                    if attempt > 1 {
                        wait = self.escalate(wait, &err);
                    }
                    // A server-advised pause is a floor, never a shortcut.
                    if let StoreError::RateLimited {
                        retry_after: Some(hint),
                    } = &err
                    {
                        wait = wait.max(*hint);
                    }
                    log::warn!("store write failed (attempt {attempt}): {err}");
                }
            }
        }
    }

    fn escalate(&self, wait: Duration, err: &StoreError) -> Duration {
        if err.is_rate_limit() {
            (wait * 2).min(self.rate_limit_ceiling)
        } else {
            wait.mul_f64(1.5).min(self.other_ceiling)
        }
    }
}

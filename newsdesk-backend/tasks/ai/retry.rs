use std::future::Future;
use std::time::{Duration, Instant};

use rand::{Rng, rng};

use super::AiError;

const MAX_JITTER_MS: u64 = 250;

/// Bounded retry with exponential backoff. Each attempt is capped by
/// `timeout`; only transient errors are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            timeout,
        }
    }

    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            ..Self::new(timeout)
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AiError::Timeout(self.timeout)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            attempt += 1;
            if !err.is_transient() || attempt > self.max_retries {
                tracing::error!(
                    call = label,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "AI call failed"
                );
                return Err(err);
            }

            let jitter_cap = MAX_JITTER_MS.min(self.base_delay.as_millis() as u64);
            let jitter = Duration::from_millis(rng().random_range(0..=jitter_cap));
            let delay = self.delay_for(attempt) + jitter;
            tracing::warn!(
                call = label,
                attempt,
                max = self.max_retries,
                ?delay,
                error = %err,
                "AI call failed; backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

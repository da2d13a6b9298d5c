use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff for external calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        let clamped_base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: clamped_base,
            max_delay_ms: max_delay_ms.max(clamped_base),
        }
    }

    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Runs `op` until it succeeds or the attempts are exhausted, returning
    /// the last error in the latter case.
    pub async fn retry_async<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.retry_async_if(op, |_| true).await
    }

    /// Like [`retry_async`](Self::retry_async), but gives up at once on an
    /// error `is_retryable` rejects.
    pub async fn retry_async_if<F, Fut, T, E, R>(&self, mut op: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    if !is_retryable(&err) {
                        log::warn!("Attempt {}/{} failed for good: {}", attempt, self.max_attempts, err);
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt - 1);
                    log::warn!(
                        "Attempt {}/{} failed: {}, retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1_000, 30_000)
    }
}

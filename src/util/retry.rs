//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use crate::error::BujjiError;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Retry every failure, not only those `is_retryable()` accepts.
    pub retry_all_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            retry_all_errors: false,
        }
    }
}

impl RetryPolicy {
    /// Back-to-back retries of any failure, used for tool invocations.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            retry_all_errors: true,
        }
    }

    /// Execute an async operation with retry.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, BujjiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BujjiError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = self.retry_all_errors || e.is_retryable();
                    if !retryable || attempt + 1 >= self.max_attempts {
                        return Err(e);
                    }

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Retrying after error"
                    );

                    if !backoff.is_zero() {
                        // Jitter: 75%–125% of backoff
                        let jitter_factor = 0.75 + (rand_factor() * 0.5);
                        let sleep_duration =
                            Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
                        tokio::time::sleep(sleep_duration).await;

                        backoff = Duration::from_secs_f64(
                            (backoff.as_secs_f64() * self.multiplier)
                                .min(self.max_backoff.as_secs_f64()),
                        );
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BujjiError::InvalidState("retry policy ran zero attempts".into())))
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}

use crate::error::DataError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timeout and exponential-backoff policy shared by the database client and
/// the HTTP admin client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the computed delay randomly added or removed (0.0 = none).
    pub jitter: f64,
    /// Per-attempt deadline.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.2,
            timeout: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; useful for tests asserting exact call counts.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            jitter: 0.0,
            timeout,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exp = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = self.base_delay.as_millis() as f64 * exp;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.base_delay_for(retry);
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = delay.as_millis() as f64 * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let millis = (delay.as_millis() as f64 + offset).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

/// Run `op` under the policy: each attempt is bounded by `policy.timeout`,
/// retryable failures are retried with backoff until attempts run out.
pub async fn retry_with_timeout<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, DataError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DataError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(DataError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "🔁 {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    op_name, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            jitter: 0.0,
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for(1).as_millis();
            assert!((160..=240).contains(&d), "delay {} out of range", d);
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_timeout(&fast_policy(3), "flaky", move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DataError::Transient("connection reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry_with_timeout(&fast_policy(3), "down", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(DataError::Transient("unreachable".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(DataError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry_with_timeout(&fast_policy(5), "invalid", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(DataError::validation("name", "required"))
            }
        })
        .await;

        assert!(matches!(result, Err(DataError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hanging_call_times_out() {
        let result: Result<(), _> = retry_with_timeout(&fast_policy(1), "hang", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DataError::Timeout(_))));
    }
}

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding-window limiter keyed by sender (email, client IP, ...).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            hits: Arc::new(DashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn per_hour(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(3600))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Records a hit for `key` if the window allows it.
    /// On rejection returns how long until the oldest hit leaves the window.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut history = self.hits.entry(key.to_string()).or_default();

        while let Some(&oldest) = history.front() {
            if now.duration_since(oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() >= self.max_requests {
            let oldest = history.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        history.push_back(now);
        Ok(())
    }

    /// Same as [`check`](Self::check) but across several keys at once: the
    /// request is admitted only if every key has room, and then counted for all.
    pub fn check_all(&self, keys: &[&str]) -> Result<(), Duration> {
        let now = Instant::now();
        for key in keys {
            if let Some(history) = self.hits.get(*key) {
                let live = history
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count();
                if live >= self.max_requests {
                    let oldest = history
                        .iter()
                        .find(|t| now.duration_since(**t) < self.window)
                        .copied()
                        .unwrap_or(now);
                    return Err(self.window.saturating_sub(now.duration_since(oldest)));
                }
            }
        }
        for key in keys {
            self.check_at(key, now)?;
        }
        Ok(())
    }

    /// Drops keys whose whole history has expired.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|_, history| {
            history
                .back()
                .map(|t| now.duration_since(*t) < self.window)
                .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_key() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("a@example.com").is_ok());
        assert!(limiter.check("a@example.com").is_ok());
        assert!(limiter.check("a@example.com").is_ok());
        let retry = limiter.check("a@example.com").unwrap_err();
        assert!(retry <= Duration::from_secs(60));

        // Other senders are unaffected
        assert!(limiter.check("b@example.com").is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_ok());
        assert!(limiter.check_at("k", start + Duration::from_secs(5)).is_err());
        assert!(limiter.check_at("k", start + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn test_check_all_counts_nothing_when_rejected() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("ip:1.2.3.4").is_ok());
        assert!(limiter.check_all(&["email:x@y.z", "ip:1.2.3.4"]).is_err());
        // The email key was not charged by the rejected request.
        assert!(limiter.check("email:x@y.z").is_ok());
    }
}

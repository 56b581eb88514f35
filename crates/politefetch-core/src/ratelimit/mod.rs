//! Per-host token-bucket rate limiter with adaptive RPS (§4.3).

mod adaptive;
mod bucket;

pub use adaptive::{AdaptiveProfile, AdaptiveState, AdjustmentReason};
pub use bucket::TokenBucket;

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{ClassifiedError, ErrorKind};

const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Feedback fed back into the limiter after a fetch attempt completes.
#[derive(Debug, Clone, Copy)]
pub enum Observation {
    RateLimited { retry_after: Option<Duration> },
    Success,
    ServerError,
}

struct Inner {
    bucket: TokenBucket,
    state: AdaptiveState,
}

/// One limiter per host. Combines a token bucket with adaptive RPS
/// feedback behind a single lock, per §5's "mutation under a per-host
/// lock" policy.
pub struct RateLimiter {
    profile: AdaptiveProfile,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(profile: AdaptiveProfile) -> Self {
        let bucket = TokenBucket::new(profile.burst);
        let state = AdaptiveState::new(&profile);
        Self { inner: Mutex::new(Inner { bucket, state }), profile }
    }

    /// `acquire(maxWait)` per §4.3: refill, consume if possible, else
    /// sleep the computed wait plus jitter and retry, failing if the
    /// wait would exceed `max_wait`.
    pub async fn acquire(&self, max_wait: Option<Duration>) -> Result<(), ClassifiedError> {
        let max_wait = max_wait.unwrap_or(DEFAULT_MAX_WAIT);
        loop {
            let wait_ms = {
                let mut guard = self.inner.lock().await;
                if let Some(pause_until) = guard.state.pause_until {
                    if pause_until > std::time::Instant::now() {
                        drop(guard);
                        let remaining = pause_until.saturating_duration_since(std::time::Instant::now());
                        if remaining > max_wait {
                            return Err(wait_exceeded());
                        }
                        sleep(remaining).await;
                        continue;
                    }
                }
                let rps = guard.state.current_rps;
                if guard.bucket.try_consume(rps) {
                    0
                } else {
                    guard.bucket.wait_ms(rps)
                }
            };
            if wait_ms == 0 {
                return Ok(());
            }
            if Duration::from_millis(wait_ms) > max_wait {
                return Err(wait_exceeded());
            }
            let jitter_ms = rand::thread_rng().gen_range(0..=((wait_ms as f64 * 0.1).min(100.0)) as u64 + 1);
            sleep(Duration::from_millis(wait_ms + jitter_ms)).await;
        }
    }

    pub async fn observe(&self, observation: Observation) {
        let mut guard = self.inner.lock().await;
        match observation {
            Observation::RateLimited { retry_after } => {
                let profile = self.profile.clone();
                guard.state.on_rate_limited(&profile, retry_after);
            }
            Observation::Success => {
                let profile = self.profile.clone();
                guard.state.on_success(&profile);
            }
            Observation::ServerError => {
                let profile = self.profile.clone();
                guard.state.on_server_error(&profile);
            }
        }
    }

    pub async fn current_rps(&self) -> f64 {
        self.inner.lock().await.state.current_rps
    }

    pub async fn pause_until_ms(&self) -> Option<u64> {
        let guard = self.inner.lock().await;
        guard.state.pause_until.map(|t| {
            t.saturating_duration_since(std::time::Instant::now()).as_millis() as u64
        })
    }
}

fn wait_exceeded() -> ClassifiedError {
    ClassifiedError::new(ErrorKind::RateLimited, "rate_limit_wait_exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        let config = RateLimitConfig { default_rps: rps, burst, ..RateLimitConfig::default() };
        RateLimiter::new(AdaptiveProfile::from_config(&config))
    }

    #[tokio::test]
    async fn acquires_immediately_within_burst() {
        let limiter = limiter(10.0, 3);
        for _ in 0..3 {
            limiter.acquire(None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn fails_when_wait_exceeds_max_wait() {
        let limiter = limiter(0.01, 1);
        limiter.acquire(None).await.unwrap();
        let result = limiter.acquire(Some(Duration::from_millis(10))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn observe_rate_limited_lowers_rps() {
        let limiter = limiter(4.0, 4);
        let before = limiter.current_rps().await;
        limiter.observe(Observation::RateLimited { retry_after: Some(Duration::from_millis(1)) }).await;
        let after = limiter.current_rps().await;
        assert!(after < before);
    }
}

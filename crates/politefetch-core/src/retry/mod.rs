//! Retry and backoff scheduler (§4.6): wraps `fetch_once` with bounded
//! retries, distinguishing retriable, rate-limited, and fatal outcomes.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::fetch::{FetchEngine, FetchOutcome, FetchRequest};

/// Shared across a batch: caps total extra attempts at `MAX_RETRIES × N`
/// items (§8 invariant).
pub struct RetryBudget {
    remaining: std::sync::atomic::AtomicU64,
}

impl RetryBudget {
    pub fn new(total: u64) -> Self {
        Self { remaining: std::sync::atomic::AtomicU64::new(total) }
    }

    fn try_spend(&self) -> bool {
        loop {
            let current = self.remaining.load(std::sync::atomic::Ordering::Relaxed);
            if current == 0 {
                return false;
            }
            if self
                .remaining
                .compare_exchange(
                    current,
                    current - 1,
                    std::sync::atomic::Ordering::Relaxed,
                    std::sync::atomic::Ordering::Relaxed,
                )
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// `computeBackoff(attempt, retryAfterMs)` per §4.6: exponential with
/// jitter, honoring a server-provided `Retry-After` within the cap.
pub fn compute_backoff(config: &RetryConfig, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let base_ms = config.base_backoff_ms as f64 * 2f64.powi((attempt.saturating_sub(1)) as i32);
    let capped = match retry_after {
        Some(ra) => ra.as_millis() as f64,
        None => base_ms,
    }
    .min(config.max_backoff_ms as f64);
    let jitter_span = capped * config.jitter_factor;
    let jitter = rand::thread_rng().gen_range(0.0..=jitter_span.max(0.0));
    Duration::from_millis((capped + jitter) as u64)
}

pub struct RetryScheduler<'a> {
    engine: &'a FetchEngine,
    config: RetryConfig,
}

impl<'a> RetryScheduler<'a> {
    pub fn new(engine: &'a FetchEngine, config: RetryConfig) -> Self {
        Self { engine, config }
    }

    /// Executes `request`, retrying per §4.6's algorithm. `budget` is
    /// optional; when exhausted, retries stop early and the last outcome
    /// surfaces.
    pub async fn execute(&self, request: FetchRequest, budget: Option<&RetryBudget>) -> FetchOutcome {
        let mut attempt: u32 = 1;
        let mut rate_limited_attempts: u32 = 0;
        loop {
            let outcome = self.engine.fetch_once(request.clone()).await;
            match &outcome {
                FetchOutcome::Success(_) => return outcome,
                FetchOutcome::RateLimited { retry_after } => {
                    rate_limited_attempts += 1;
                    if rate_limited_attempts >= self.config.max_retries {
                        return outcome;
                    }
                    if let Some(budget) = budget {
                        if !budget.try_spend() {
                            return outcome;
                        }
                    }
                    let delay = compute_backoff(&self.config, attempt, *retry_after);
                    sleep(delay).await;
                    attempt += 1;
                }
                FetchOutcome::Network(_) | FetchOutcome::Timeout => {
                    if attempt >= self.config.max_retries {
                        return outcome;
                    }
                    if let Some(budget) = budget {
                        if !budget.try_spend() {
                            return outcome;
                        }
                    }
                    let delay = compute_backoff(&self.config, attempt, None);
                    sleep(delay).await;
                    attempt += 1;
                }
                FetchOutcome::CircuitOpen { .. } | FetchOutcome::Validation(_) | FetchOutcome::Parse(_) => {
                    return outcome;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig { base_backoff_ms: 100, max_backoff_ms: 1000, jitter_factor: 0.3, max_retries: 3 }
    }

    #[test]
    fn backoff_stays_within_cap_plus_jitter() {
        let config = config();
        for attempt in 1..10 {
            let backoff = compute_backoff(&config, attempt, None);
            let max_allowed = config.max_backoff_ms as f64 * (1.0 + config.jitter_factor);
            assert!((backoff.as_millis() as f64) <= max_allowed + 1.0);
        }
    }

    #[test]
    fn retry_after_is_honored_within_cap() {
        let config = config();
        let backoff = compute_backoff(&config, 1, Some(Duration::from_millis(5000)));
        assert!(backoff.as_millis() as u64 <= config.max_backoff_ms + (config.max_backoff_ms as f64 * config.jitter_factor) as u64);
    }

    #[test]
    fn retry_budget_is_exhaustible() {
        let budget = RetryBudget::new(2);
        assert!(budget.try_spend());
        assert!(budget.try_spend());
        assert!(!budget.try_spend());
    }
}

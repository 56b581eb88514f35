//! Per-host circuit breaker state machine (§4.4).
//!
//! Resolves the cyclic dependency noted in spec §9 with a two-step
//! protocol: `call_gate` returns a decision before the request, and the
//! caller reports the outcome afterward via `report_outcome`. No shared
//! call stack recursion between the breaker and the fetch engine.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::defaults::HALF_OPEN_CLOSE_THRESHOLD;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

/// Tuned per host (§3 "Recovery strategy").
#[derive(Debug, Clone)]
pub struct RecoveryStrategy {
    pub initial_reset: Duration,
    pub max_reset: Duration,
    pub backoff_multiplier: f64,
    pub probe_request_path: Option<String>,
    pub half_open_probe_limit: u32,
    pub failure_threshold: u32,
    pub max_reset_attempts: u32,
}

/// Bypasses the breaker itself to test recovery before an `open →
/// half-open` transition, per §4.4. Injected so tests can substitute an
/// in-memory server instead of a real network probe.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &str) -> bool;
}

/// A `Prober` that always reports success — used when no
/// `probe_request_path` is configured, or in tests.
pub struct AlwaysSucceeds;

#[async_trait]
impl Prober for AlwaysSucceeds {
    async fn probe(&self, _path: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Proceed,
    ProceedAsProbe,
    Reject { remaining_ms: u64 },
}

struct Record {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_calls: u32,
    half_open_successes: u32,
    consecutive_openings: u32,
    current_reset: Duration,
    last_success: Option<Instant>,
}

impl Record {
    fn new(strategy: &RecoveryStrategy) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_calls: 0,
            half_open_successes: 0,
            consecutive_openings: 0,
            current_reset: strategy.initial_reset,
            last_success: None,
        }
    }
}

pub struct CircuitBreaker {
    strategy: RecoveryStrategy,
    record: Mutex<Record>,
}

impl CircuitBreaker {
    pub fn new(strategy: RecoveryStrategy) -> Self {
        let record = Record::new(&strategy);
        Self { strategy, record: Mutex::new(record) }
    }

    /// Returns the gate decision for the next request, running the
    /// `open → half-open` self-probe if the reset window has elapsed.
    pub async fn call_gate(&self, prober: &dyn Prober) -> GateDecision {
        let mut record = self.record.lock().await;
        match record.state {
            CircuitState::Closed => GateDecision::Proceed,
            CircuitState::Open => {
                let opened_at = record.opened_at.expect("open state always has opened_at");
                let elapsed = opened_at.elapsed();
                if elapsed < record.current_reset {
                    let remaining = record.current_reset - elapsed;
                    return GateDecision::Reject { remaining_ms: remaining.as_millis() as u64 };
                }
                if record.consecutive_openings >= self.strategy.max_reset_attempts {
                    return GateDecision::Reject { remaining_ms: u64::MAX };
                }
                let probe_path = self.strategy.probe_request_path.as_deref().unwrap_or("/robots.txt");
                let ok = prober.probe(probe_path).await;
                if ok {
                    record.state = CircuitState::HalfOpen;
                    record.half_open_calls = 1;
                    record.half_open_successes = 0;
                    GateDecision::ProceedAsProbe
                } else {
                    record.opened_at = Some(Instant::now());
                    record.consecutive_openings += 1;
                    record.current_reset = Duration::from_secs_f64(
                        (record.current_reset.as_secs_f64() * self.strategy.backoff_multiplier)
                            .min(self.strategy.max_reset.as_secs_f64()),
                    );
                    GateDecision::Reject { remaining_ms: record.current_reset.as_millis() as u64 }
                }
            }
            CircuitState::HalfOpen => {
                if record.half_open_calls >= self.strategy.half_open_probe_limit {
                    return GateDecision::Reject { remaining_ms: 0 };
                }
                record.half_open_calls += 1;
                GateDecision::ProceedAsProbe
            }
        }
    }

    /// Reports the outcome of a request let through by `call_gate`. Only
    /// `network`, `timeout`, `server_5xx` count as failures (§4.4/§7);
    /// pass `None` for outcomes that should not affect circuit health
    /// (rate_limited, client_4xx, validation, circuit_open).
    pub async fn report_outcome(&self, outcome: Option<Result<(), ErrorKind>>) {
        let mut record = self.record.lock().await;
        let Some(outcome) = outcome else { return };
        match outcome {
            Ok(()) => self.on_success(&mut record),
            Err(kind) if kind.counts_toward_circuit() => self.on_failure(&mut record),
            Err(_) => {}
        }
    }

    fn on_success(&self, record: &mut Record) {
        record.last_success = Some(Instant::now());
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                record.half_open_successes += 1;
                if record.half_open_successes >= HALF_OPEN_CLOSE_THRESHOLD {
                    record.state = CircuitState::Closed;
                    record.consecutive_failures = 0;
                    record.half_open_calls = 0;
                    record.consecutive_openings = 0;
                    record.current_reset = self.strategy.initial_reset;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, record: &mut Record) {
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures += 1;
                if record.consecutive_failures >= self.strategy.failure_threshold {
                    self.open(record);
                }
            }
            CircuitState::HalfOpen => {
                self.open(record);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, record: &mut Record) {
        record.state = CircuitState::Open;
        record.opened_at = Some(Instant::now());
        record.consecutive_openings += 1;
        if record.consecutive_openings > 1 {
            record.current_reset = Duration::from_secs_f64(
                (record.current_reset.as_secs_f64() * self.strategy.backoff_multiplier)
                    .min(self.strategy.max_reset.as_secs_f64()),
            );
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.record.lock().await.state
    }

    pub async fn snapshot(&self) -> (CircuitState, Option<u64>) {
        let record = self.record.lock().await;
        let remaining = match (record.state, record.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                let elapsed = opened_at.elapsed();
                Some(record.current_reset.saturating_sub(elapsed).as_millis() as u64)
            }
            _ => None,
        };
        (record.state, remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> RecoveryStrategy {
        RecoveryStrategy {
            initial_reset: Duration::from_millis(20),
            max_reset: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            probe_request_path: Some("/robots.txt".to_string()),
            half_open_probe_limit: 1,
            failure_threshold: 3,
            max_reset_attempts: 6,
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(strategy());
        for _ in 0..3 {
            breaker.report_outcome(Some(Err(ErrorKind::Server5xx))).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn rate_limited_and_4xx_do_not_count() {
        let breaker = CircuitBreaker::new(strategy());
        for _ in 0..10 {
            breaker.report_outcome(Some(Err(ErrorKind::RateLimited))).await;
            breaker.report_outcome(Some(Err(ErrorKind::Client4xx))).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_rejects_until_reset_elapses_then_probes() {
        let breaker = CircuitBreaker::new(strategy());
        for _ in 0..3 {
            breaker.report_outcome(Some(Err(ErrorKind::Network))).await;
        }
        let decision = breaker.call_gate(&AlwaysSucceeds).await;
        assert!(matches!(decision, GateDecision::Reject { .. }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        let decision = breaker.call_gate(&AlwaysSucceeds).await;
        assert_eq!(decision, GateDecision::ProceedAsProbe);
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn two_successes_in_half_open_closes() {
        let breaker = CircuitBreaker::new(RecoveryStrategy { half_open_probe_limit: 5, ..strategy() });
        for _ in 0..3 {
            breaker.report_outcome(Some(Err(ErrorKind::Network))).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.call_gate(&AlwaysSucceeds).await;
        breaker.report_outcome(Some(Ok(()))).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.report_outcome(Some(Ok(()))).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn failure_in_half_open_reopens_and_backs_off() {
        let breaker = CircuitBreaker::new(strategy());
        for _ in 0..3 {
            breaker.report_outcome(Some(Err(ErrorKind::Network))).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.call_gate(&AlwaysSucceeds).await;
        breaker.report_outcome(Some(Err(ErrorKind::Timeout))).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        let record = breaker.record.lock().await;
        assert!(record.current_reset > Duration::from_millis(20));
    }
}

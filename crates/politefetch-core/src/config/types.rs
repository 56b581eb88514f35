//! Config value types. Every field documented per the teacher's config
//! layout; defaults live in `super::defaults`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of items processed concurrently by the batch worker pool.
    pub max_concurrency: usize,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub timeouts: TimeoutConfig,
    pub batch: BatchConfig,
    /// Per-host rate/burst overrides, keyed by bare host (no port).
    pub host_limits: HashMap<String, HostLimit>,
    /// Minimum delay between consecutive requests issued by any one worker.
    pub inter_request_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: defaults::MAX_CONCURRENCY,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            timeouts: TimeoutConfig::default(),
            batch: BatchConfig::default(),
            host_limits: HashMap::new(),
            inter_request_delay_ms: defaults::INTER_REQUEST_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostLimit {
    pub rps: f64,
    pub burst: u32,
}

impl Default for HostLimit {
    fn default() -> Self {
        Self { rps: defaults::DEFAULT_RPS, burst: defaults::DEFAULT_BURST }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second for hosts without a profile override.
    pub default_rps: f64,
    pub max_rps: f64,
    pub min_rps: f64,
    pub burst: u32,
    /// Multiplier applied to `currentRPS` on a 429 or streaked 5xx. Must be < 1.
    pub backoff_multiplier: f64,
    /// Multiplier applied to `currentRPS` on sustained success. Must be > 1.
    pub recovery_multiplier: f64,
    /// Consecutive successes required before recovery is considered.
    pub recovery_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_rps: defaults::DEFAULT_RPS,
            max_rps: defaults::MAX_RPS,
            min_rps: defaults::MIN_RPS,
            burst: defaults::DEFAULT_BURST,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            recovery_multiplier: defaults::RECOVERY_MULTIPLIER,
            recovery_threshold: defaults::RECOVERY_THRESHOLD,
            cooldown_ms: defaults::COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_backoff_ms: defaults::BASE_BACKOFF_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            jitter_factor: defaults::JITTER_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub initial_reset_ms: u64,
    pub max_reset_ms: u64,
    pub backoff_multiplier: f64,
    pub half_open_max_calls: u32,
    pub max_reset_attempts: u32,
    pub probe_request_path: Option<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::CIRCUIT_BREAKER_THRESHOLD,
            initial_reset_ms: defaults::CIRCUIT_BREAKER_RESET_MS,
            max_reset_ms: defaults::CIRCUIT_BREAKER_MAX_RESET_MS,
            backoff_multiplier: defaults::CIRCUIT_BREAKER_BACKOFF_MULTIPLIER,
            half_open_max_calls: defaults::CIRCUIT_BREAKER_HALF_OPEN_MAX_CALLS,
            max_reset_attempts: defaults::CIRCUIT_BREAKER_MAX_RESET_ATTEMPTS,
            probe_request_path: Some("/robots.txt".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
        }
    }
}

impl TimeoutConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub delay_ms: u64,
    pub chunk_size: usize,
    pub max_urls_per_batch: usize,
    pub error_report_size: usize,
    pub circuit_monitoring_interval_ms: u64,
    pub auto_pause_on_circuit_open: bool,
    pub enable_memory_optimization: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::BATCH_CONCURRENCY,
            delay_ms: defaults::BATCH_DELAY_MS,
            chunk_size: defaults::BATCH_CHUNK_SIZE,
            max_urls_per_batch: defaults::MAX_URLS_PER_BATCH,
            error_report_size: defaults::ERROR_REPORT_SIZE,
            circuit_monitoring_interval_ms: defaults::CIRCUIT_MONITORING_INTERVAL_MS,
            auto_pause_on_circuit_open: true,
            enable_memory_optimization: true,
        }
    }
}

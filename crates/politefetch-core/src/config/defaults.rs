//! Built-in defaults, layer 1 of the three-layer config load (§1.3).

pub const MAX_CONCURRENCY: usize = 5;

pub const DEFAULT_RPS: f64 = 1.0;
pub const MAX_RPS: f64 = 10.0;
pub const MIN_RPS: f64 = 0.1;
pub const DEFAULT_BURST: u32 = 5;
pub const BACKOFF_MULTIPLIER: f64 = 0.5;
pub const RECOVERY_MULTIPLIER: f64 = 1.2;
pub const RECOVERY_THRESHOLD: u32 = 10;
pub const COOLDOWN_MS: u64 = 30_000;

pub const MAX_RETRIES: u32 = 3;
pub const BASE_BACKOFF_MS: u64 = 500;
pub const MAX_BACKOFF_MS: u64 = 30_000;
pub const JITTER_FACTOR: f64 = 0.3;

pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
pub const CIRCUIT_BREAKER_RESET_MS: u64 = 30_000;
pub const CIRCUIT_BREAKER_MAX_RESET_MS: u64 = 600_000;
pub const CIRCUIT_BREAKER_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const CIRCUIT_BREAKER_HALF_OPEN_MAX_CALLS: u32 = 1;
pub const CIRCUIT_BREAKER_MAX_RESET_ATTEMPTS: u32 = 6;
pub const HALF_OPEN_CLOSE_THRESHOLD: u32 = 2;

pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const READ_TIMEOUT_MS: u64 = 30_000;

pub const BATCH_CONCURRENCY: usize = 5;
pub const BATCH_DELAY_MS: u64 = 250;
pub const BATCH_CHUNK_SIZE: usize = 100;
pub const MAX_URLS_PER_BATCH: usize = 1500;
pub const ERROR_REPORT_SIZE: usize = 20;
pub const CIRCUIT_MONITORING_INTERVAL_MS: u64 = 5_000;

pub const INTER_REQUEST_DELAY_MS: u64 = 0;

pub const HOST_BUCKET_IDLE_EVICT_MS: u64 = 30 * 60 * 1000;
pub const HOST_CIRCUIT_IDLE_EVICT_MS: u64 = 15 * 60 * 1000;
pub const HOST_REGISTRY_CLEANUP_INTERVAL_MS: u64 = 5 * 60 * 1000;

pub const CANONICALIZATION_CACHE_TTL_MS: u64 = 30 * 60 * 1000;
pub const ROBOTS_CACHE_TTL_MS: u64 = 60 * 60 * 1000;

pub const PAGINATION_CONSECUTIVE_404_THRESHOLD: u32 = 5;
pub const PAGINATION_LETTER_404_THRESHOLD: u32 = 3;
pub const PAGINATION_LETTER_MAX_PAGES: u32 = 10;
pub const PAGINATION_INTER_PAGE_DELAY_MS: u64 = 200;
pub const PAGINATION_INTER_LETTER_DELAY_MS: u64 = 500;

pub const SHUTDOWN_DRAIN_TIMEOUT_MS: u64 = 30_000;

pub const USER_AGENT_PRODUCT: &str = "politefetch";

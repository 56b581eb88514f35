//! Per-host state registry (§4.2): lazily-constructed token buckets and
//! circuit breakers, keyed by host, with TTL eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::circuit::{CircuitBreaker, RecoveryStrategy};
use crate::config::defaults;
use crate::config::Config;
use crate::ratelimit::{AdaptiveProfile, RateLimiter};

/// The lower-cased `host:port` derived from a parsed URL (§3 "Host key").
pub type HostKey = String;

pub fn host_key(url: &url::Url) -> Option<HostKey> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

struct BucketEntry {
    limiter: Arc<RateLimiter>,
    last_touched: Instant,
}

struct CircuitEntry {
    breaker: Arc<CircuitBreaker>,
    last_touched: Instant,
}

/// Process-wide registry of per-host rate limiters and circuit breakers.
/// Construction on miss looks up the host's profile by exact host, then
/// bare-host without `www.`, then the default profile (§4.2). Buckets and
/// circuits are tracked in separate maps with independent idle clocks
/// (§4.2): a host's circuit can retire on its own 15-minute TTL without
/// waiting on the bucket's 30-minute one, and vice versa.
pub struct Registry {
    config: Config,
    buckets: RwLock<HashMap<HostKey, BucketEntry>>,
    circuits: RwLock<HashMap<HostKey, CircuitEntry>>,
    cleanup_handle: RwLock<Option<JoinHandle<()>>>,
}

impl Registry {
    pub fn new(config: Config) -> Arc<Self> {
        let registry = Arc::new(Self {
            config,
            buckets: RwLock::new(HashMap::new()),
            circuits: RwLock::new(HashMap::new()),
            cleanup_handle: RwLock::new(None),
        });
        registry.clone().spawn_cleanup_task();
        registry
    }

    fn spawn_cleanup_task(self: Arc<Self>) {
        let interval = Duration::from_millis(defaults::HOST_REGISTRY_CLEANUP_INTERVAL_MS);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.evict_idle().await;
            }
        });
        // best-effort: if called again before shutdown, the old handle is dropped (aborted on drop).
        if let Ok(mut guard) = self.cleanup_handle.try_write() {
            *guard = Some(handle);
        }
    }

    async fn evict_idle(&self) {
        let bucket_idle = Duration::from_millis(defaults::HOST_BUCKET_IDLE_EVICT_MS);
        let circuit_idle = Duration::from_millis(defaults::HOST_CIRCUIT_IDLE_EVICT_MS);
        let now = Instant::now();
        self.buckets.write().await.retain(|_, entry| now.duration_since(entry.last_touched) < bucket_idle);
        self.circuits.write().await.retain(|_, entry| now.duration_since(entry.last_touched) < circuit_idle);
    }

    fn profile_for(&self, host: &HostKey) -> AdaptiveProfile {
        let bare = host.strip_prefix("www.").unwrap_or(host);
        if let Some(limit) = self.config.host_limits.get(host).or_else(|| self.config.host_limits.get(bare)) {
            AdaptiveProfile::with_override(&self.config.rate_limit, limit.rps, limit.burst)
        } else {
            AdaptiveProfile::from_config(&self.config.rate_limit)
        }
    }

    fn strategy(&self) -> RecoveryStrategy {
        let cb = &self.config.circuit_breaker;
        RecoveryStrategy {
            initial_reset: Duration::from_millis(cb.initial_reset_ms),
            max_reset: Duration::from_millis(cb.max_reset_ms),
            backoff_multiplier: cb.backoff_multiplier,
            probe_request_path: cb.probe_request_path.clone(),
            half_open_probe_limit: cb.half_open_max_calls,
            failure_threshold: cb.threshold,
            max_reset_attempts: cb.max_reset_attempts,
        }
    }

    /// Returns (and lazily creates) the rate limiter for a host.
    pub async fn get_bucket(&self, host: &HostKey) -> Arc<RateLimiter> {
        {
            let mut buckets = self.buckets.write().await;
            if let Some(entry) = buckets.get_mut(host) {
                entry.last_touched = Instant::now();
                return entry.limiter.clone();
            }
        }
        let limiter = Arc::new(RateLimiter::new(self.profile_for(host)));
        let mut buckets = self.buckets.write().await;
        let entry = buckets
            .entry(host.clone())
            .or_insert_with(|| BucketEntry { limiter: limiter.clone(), last_touched: Instant::now() });
        entry.last_touched = Instant::now();
        entry.limiter.clone()
    }

    /// Returns (and lazily creates) the circuit breaker for a host.
    pub async fn get_circuit(&self, host: &HostKey) -> Arc<CircuitBreaker> {
        {
            let mut circuits = self.circuits.write().await;
            if let Some(entry) = circuits.get_mut(host) {
                entry.last_touched = Instant::now();
                return entry.breaker.clone();
            }
        }
        let breaker = Arc::new(CircuitBreaker::new(self.strategy()));
        let mut circuits = self.circuits.write().await;
        let entry = circuits
            .entry(host.clone())
            .or_insert_with(|| CircuitEntry { breaker: breaker.clone(), last_touched: Instant::now() });
        entry.last_touched = Instant::now();
        entry.breaker.clone()
    }

    pub async fn known_hosts(&self) -> Vec<HostKey> {
        let mut hosts: Vec<HostKey> = self.buckets.read().await.keys().cloned().collect();
        for host in self.circuits.read().await.keys() {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        hosts
    }

    /// Drains pending state on shutdown within `timeout`, per §4.2/§5.
    pub async fn shutdown(&self, timeout: Duration) {
        if let Some(handle) = self.cleanup_handle.write().await.take() {
            handle.abort();
        }
        let _ = tokio::time::timeout(timeout, async {
            self.buckets.write().await.clear();
            self.circuits.write().await.clear();
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_includes_explicit_port() {
        let url = url::Url::parse("https://Example.com:8443/path").unwrap();
        assert_eq!(host_key(&url).unwrap(), "example.com:8443");
    }

    #[test]
    fn host_key_lowercases_and_omits_default_port() {
        let url = url::Url::parse("https://EXAMPLE.com/path").unwrap();
        assert_eq!(host_key(&url).unwrap(), "example.com");
    }

    #[tokio::test]
    async fn same_host_returns_same_limiter_instance() {
        let registry = Registry::new(Config::default());
        let a = registry.get_bucket(&"example.com".to_string()).await;
        let b = registry.get_bucket(&"example.com".to_string()).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_hosts_get_independent_state() {
        let registry = Registry::new(Config::default());
        let a = registry.get_circuit(&"a.example.com".to_string()).await;
        let b = registry.get_circuit(&"b.example.com".to_string()).await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn circuit_and_bucket_evict_on_independent_clocks() {
        let registry = Registry::new(Config::default());
        let host = "example.com".to_string();
        let _ = registry.get_bucket(&host).await;
        let _ = registry.get_circuit(&host).await;

        // Backdate only the circuit entry past its 15-minute TTL; the
        // bucket (30-minute TTL) must survive the same sweep.
        {
            let mut circuits = registry.circuits.write().await;
            circuits.get_mut(&host).unwrap().last_touched =
                Instant::now() - Duration::from_millis(defaults::HOST_CIRCUIT_IDLE_EVICT_MS + 1);
        }
        registry.evict_idle().await;

        assert!(registry.circuits.read().await.get(&host).is_none());
        assert!(registry.buckets.read().await.get(&host).is_some());
    }
}

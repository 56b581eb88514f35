//! Correlation IDs and a small counter/gauge registry (§3 "Correlation
//! IDs", §4.10/§6 observability endpoint).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use uuid::Uuid;

/// Opaque stable identifier tying a logical job's events together.
pub type CorrelationId = String;

pub fn new_correlation_id() -> CorrelationId {
    Uuid::new_v4().to_string()
}

/// Generated per attempt, distinct from the job-level correlation id.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<&'static str, AtomicU64>>,
    gauges: RwLock<HashMap<&'static str, AtomicI64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &'static str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &'static str, amount: u64) {
        if let Some(counter) = self.counters.read().unwrap().get(name) {
            counter.fetch_add(amount, Ordering::Relaxed);
            return;
        }
        let mut counters = self.counters.write().unwrap();
        counters.entry(name).or_insert_with(|| AtomicU64::new(0)).fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &'static str, value: i64) {
        if let Some(gauge) = self.gauges.read().unwrap().get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        let mut gauges = self.gauges.write().unwrap();
        gauges.entry(name).or_insert_with(|| AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().unwrap().get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.read().unwrap().get(name).map(|g| g.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.to_string(), v.load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(new_correlation_id(), new_correlation_id());
    }

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRegistry::new();
        metrics.incr("requests");
        metrics.incr("requests");
        metrics.incr_by("requests", 3);
        assert_eq!(metrics.counter("requests"), 5);
    }

    #[test]
    fn gauges_overwrite() {
        let metrics = MetricsRegistry::new();
        metrics.set_gauge("inflight", 3);
        metrics.set_gauge("inflight", 1);
        assert_eq!(metrics.gauge("inflight"), 1);
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ballast_llm::chain::{ChainObserver, TierEvent};
use dashmap::DashMap;

/// Process-wide counters and gauges. Constructed once at startup and shared
/// by `Arc`; entries are never cleared.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, f64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically bump `key`, returning the new value.
    pub fn increment_counter(&self, key: &str) -> u64 {
        self.add_counter(key, 1)
    }

    pub fn add_counter(&self, key: &str, n: u64) -> u64 {
        if let Some(counter) = self.counters.get(key) {
            return counter.fetch_add(n, Ordering::Relaxed) + n;
        }
        self.counters
            .entry(key.to_owned())
            .or_default()
            .fetch_add(n, Ordering::Relaxed)
            + n
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Overwrite the gauge `key`.
    pub fn record_metric(&self, key: &str, value: f64) {
        self.gauges.insert(key.to_owned(), value);
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.gauges.get(key).map(|g| *g)
    }

    /// Sorted copy of every counter.
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Sorted copy of every gauge.
    pub fn gauges(&self) -> BTreeMap<String, f64> {
        self.gauges.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }
}

impl ChainObserver for MetricsRegistry {
    fn on_tier(&self, provider: &str, event: TierEvent) {
        self.increment_counter(&format!("chain.{provider}.{}", event.as_str()));
    }
}

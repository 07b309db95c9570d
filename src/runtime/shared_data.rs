//! Named maps and counters shared by every worker on a runtime.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Concurrent map shared under a name
pub type LocalMap = Arc<DashMap<String, Value>>;

#[derive(Debug, Clone, Default)]
pub struct SharedData {
    maps: Arc<DashMap<String, LocalMap>>,
    counters: Arc<DashMap<String, Counter>>,
}

impl SharedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map registered under `name`, created on first use
    pub fn local_map(&self, name: &str) -> LocalMap {
        self.maps
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }

    pub fn remove_local_map(&self, name: &str) -> bool {
        self.maps.remove(name).is_some()
    }

    /// Counter registered under `name`, starting at zero
    pub fn counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicI64>);

impl Counter {
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.0.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn compare_and_set(&self, expected: i64, value: i64) -> bool {
        self.0
            .compare_exchange(expected, value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

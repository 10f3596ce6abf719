#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Single-slot memo for snapshot queries with a time tolerance.
//!
//! Two queries share a result when they select exactly the same agents and
//! their times differ by less than the configured tolerance. The cache keeps
//! only the most recent result, so repeated queries at one logical frame never
//! accumulate memory.

use std::sync::Arc;

use route_replay_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};

/// Default time tolerance in simulated seconds.
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 30.0;

/// Configuration parameters required to construct the cache.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    tolerance_seconds: f64,
}

impl Config {
    /// Creates a configuration using the provided time tolerance.
    #[must_use]
    pub const fn new(tolerance_seconds: f64) -> Self {
        Self { tolerance_seconds }
    }

    /// Time tolerance in seconds.
    #[must_use]
    pub const fn tolerance_seconds(&self) -> f64 {
        self.tolerance_seconds
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_SECONDS)
    }
}

/// Query time paired with the sorted, de-duplicated agent selection.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheKey {
    time: Timestamp,
    agents: Vec<AgentId>,
}

impl CacheKey {
    /// Creates a key, normalising the agent selection.
    #[must_use]
    pub fn new(time: Timestamp, agents: impl IntoIterator<Item = AgentId>) -> Self {
        let mut agents: Vec<AgentId> = agents.into_iter().collect();
        agents.sort_unstable();
        agents.dedup();
        Self { time, agents }
    }

    /// Exact query time captured by the key.
    #[must_use]
    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// Agents selected by the key in ascending order.
    #[must_use]
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }
}

/// Hit and miss counters accumulated by a cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the slot.
    pub hits: u64,
    /// Lookups that required a recomputation.
    pub misses: u64,
    /// Times the slot was cleared by invalidation or a selection change.
    pub invalidations: u64,
}

#[derive(Debug)]
struct Entry<T> {
    key: CacheKey,
    value: Arc<T>,
}

/// Single-slot cache keyed by query time and agent selection.
#[derive(Debug)]
pub struct QueryCache<T> {
    tolerance_seconds: f64,
    slot: Option<Entry<T>>,
    last_cache_time: Option<Timestamp>,
    stats: CacheStats,
}

impl<T> QueryCache<T> {
    /// Creates an empty cache using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            tolerance_seconds: config.tolerance_seconds(),
            slot: None,
            last_cache_time: None,
            stats: CacheStats::default(),
        }
    }

    /// Returns the cached value for the query or computes and stores a new one.
    ///
    /// `compute` is invoked only on a miss.
    pub fn get_or_compute<F>(
        &mut self,
        time: Timestamp,
        agents: impl IntoIterator<Item = AgentId>,
        compute: F,
    ) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let key = CacheKey::new(time, agents);
        if let Some(value) = self.lookup_key(&key) {
            return value;
        }
        self.store(key, compute())
    }

    /// Returns the cached value when the query falls within tolerance.
    ///
    /// A lookup for a different agent selection clears the slot.
    pub fn lookup(
        &mut self,
        time: Timestamp,
        agents: impl IntoIterator<Item = AgentId>,
    ) -> Option<Arc<T>> {
        self.lookup_key(&CacheKey::new(time, agents))
    }

    /// Stores a freshly computed value for the exact query.
    pub fn commit(
        &mut self,
        time: Timestamp,
        agents: impl IntoIterator<Item = AgentId>,
        value: T,
    ) -> Arc<T> {
        self.store(CacheKey::new(time, agents), value)
    }

    /// Clears the slot.
    pub fn invalidate(&mut self) {
        if self.slot.take().is_some() {
            self.stats.invalidations += 1;
        }
        self.last_cache_time = None;
    }

    /// Time of the most recent commit, if the slot is populated.
    #[must_use]
    pub fn last_cache_time(&self) -> Option<Timestamp> {
        self.last_cache_time
    }

    /// Key of the cached entry, if any.
    #[must_use]
    pub fn cached_key(&self) -> Option<&CacheKey> {
        self.slot.as_ref().map(|entry| &entry.key)
    }

    /// Hit and miss counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn lookup_key(&mut self, key: &CacheKey) -> Option<Arc<T>> {
        let Some(entry) = &self.slot else {
            self.stats.misses += 1;
            return None;
        };

        if entry.key.agents != key.agents {
            self.invalidate();
            self.stats.misses += 1;
            return None;
        }

        let within_tolerance = self
            .last_cache_time
            .is_some_and(|cached| key.time.distance(cached) < self.tolerance_seconds);
        if within_tolerance {
            self.stats.hits += 1;
            Some(Arc::clone(&entry.value))
        } else {
            self.stats.misses += 1;
            None
        }
    }

    fn store(&mut self, key: CacheKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.last_cache_time = Some(key.time);
        self.slot = Some(Entry {
            key,
            value: Arc::clone(&value),
        });
        value
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalises_selection() {
        let key = CacheKey::new(
            Timestamp::from_unix_seconds(0.0),
            [AgentId::new(3), AgentId::new(1), AgentId::new(3)],
        );
        assert_eq!(key.agents(), &[AgentId::new(1), AgentId::new(3)]);
    }

    #[test]
    fn invalidate_on_empty_slot_is_not_counted() {
        let mut cache: QueryCache<u32> = QueryCache::default();
        cache.invalidate();
        assert_eq!(cache.stats().invalidations, 0);
        assert!(cache.last_cache_time().is_none());
    }
}

//! In-process counter store.
//!
//! Counters live in a sharded concurrent map. The shard lock is held for the
//! whole increment-or-create step and never across an await point. Only
//! suitable when a single process serves the endpoint.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use super::clock::{Clock, SystemClock};
use super::{CounterSnapshot, CounterStore, StoreError};
use crate::ratelimit::CounterKey;

/// A counter and the instant its window closes.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl CounterEntry {
    fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            expires_at: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Counter store backed by a `DashMap`.
#[derive(Debug)]
pub struct MemoryCounterStore {
    entries: DashMap<CounterKey, CounterEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Current count for a key, or `None` if it has no live entry.
    pub fn get_count(&self, key: &CounterKey) -> Option<u64> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
    }

    /// Drop entries whose window has closed.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_with_expiry(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let now = self.clock.now();
        let mut created = false;

        let mut entry = self.entries.entry(key.clone()).or_insert_with(|| {
            created = true;
            CounterEntry::new(now, window)
        });

        if !created {
            if entry.is_expired(now) {
                *entry = CounterEntry::new(now, window);
                created = true;
            } else {
                entry.count += 1;
            }
        }

        let snapshot = CounterSnapshot {
            count: entry.count,
            ttl: entry.ttl(now),
            created,
        };
        drop(entry);

        trace!(key = %key, count = snapshot.count, created, "Incremented in-memory counter");

        Ok(snapshot)
    }
}

//! Shared counter store.
//!
//! The decision engine depends only on the [`CounterStore`] trait. Every
//! implementation must perform the increment-with-expiry step as one
//! indivisible operation: concurrent callers on any process observe either
//! the whole effect or none of it.

mod clock;
mod memory;
mod redis_store;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::ratelimit::CounterKey;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryCounterStore;
pub use redis_store::{RedisCounterStore, RedisStoreConfig};

/// Errors returned by a counter store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected reply from counter store: {0}")]
    UnexpectedReply(String),
}

/// State of a counter immediately after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Post-increment count
    pub count: u64,
    /// Remaining time-to-live of the entry
    pub ttl: Duration,
    /// Whether this increment started a new window
    pub created: bool,
}

/// A key-value store with atomic counters and per-key expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` by one.
    ///
    /// If the key has no live entry (never written, expired, or present
    /// without an expiry), a fresh entry with count 1 and a TTL of `window`
    /// is created instead. Both branches are atomic with respect to every
    /// other caller.
    async fn increment_with_expiry(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError>;
}

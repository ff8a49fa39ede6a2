//! Rate limit decisions.

use super::policy::RateLimitPolicy;
use crate::store::CounterSnapshot;

/// Outcome of one admission check, with quota metadata for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Configured maximum for the window
    pub limit: u64,
    /// Requests still admissible in the current window
    pub remaining: u64,
    /// Seconds until the current window closes
    pub reset_seconds: u64,
}

impl RateLimitDecision {
    /// Derive a decision from the counter state after an increment.
    ///
    /// A freshly created window reports the full window length; otherwise
    /// the observed TTL is truncated to whole seconds and capped at the
    /// window length.
    pub fn from_snapshot(policy: &RateLimitPolicy, snapshot: CounterSnapshot) -> Self {
        let limit = policy.max_count();
        let window_seconds = policy.window_seconds();

        let reset_seconds = if snapshot.created {
            window_seconds
        } else {
            let ttl_ms = snapshot.ttl.as_millis() as u64;
            (ttl_ms / 1000).min(window_seconds)
        };

        Self {
            allowed: snapshot.count <= limit,
            limit,
            remaining: limit.saturating_sub(snapshot.count),
            reset_seconds,
        }
    }
}

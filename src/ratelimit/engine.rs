//! Fixed-window rate limit decision engine.
//!
//! Each check is one round trip to the shared counter store. The engine keeps
//! no counters of its own, so every service instance pointed at the same
//! store enforces the same quota.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::RateLimiterBackend;
use super::decision::RateLimitDecision;
use super::key::CounterKey;
use super::policy::PolicyRegistry;
use crate::error::{GatekeeperError, Result};
use crate::store::CounterStore;

/// Decides whether a (recipient, type) subject has quota left.
pub struct RateLimitEngine {
    /// Policies, fixed for the lifetime of the engine.
    registry: Arc<PolicyRegistry>,
    /// The shared counter store.
    store: Arc<dyn CounterStore>,
}

impl RateLimitEngine {
    /// Create an engine over a policy registry and a counter store.
    pub fn new(registry: Arc<PolicyRegistry>, store: Arc<dyn CounterStore>) -> Self {
        Self { registry, store }
    }

    /// The policy registry this engine consults.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Count one request against the subject's quota and decide on it.
    ///
    /// The caller is expected to have checked the type with
    /// [`PolicyRegistry::is_known_type`]; an unknown type yields
    /// [`GatekeeperError::UnknownType`] without touching the store.
    pub async fn decide(&self, subject: &str, type_name: &str) -> Result<RateLimitDecision> {
        let policy = self
            .registry
            .lookup(type_name)
            .ok_or_else(|| GatekeeperError::UnknownType(type_name.to_string()))?;

        let key = CounterKey::new(subject, policy.type_name());

        trace!(
            key = %key,
            limit = policy.max_count(),
            window_seconds = policy.window_seconds(),
            "Checking rate limit"
        );

        let snapshot = self
            .store
            .increment_with_expiry(&key, policy.window())
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Counter store operation failed");
                GatekeeperError::Store(e)
            })?;

        let decision = RateLimitDecision::from_snapshot(policy, snapshot);

        if decision.allowed {
            trace!(
                key = %key,
                count = snapshot.count,
                remaining = decision.remaining,
                "Request within limit"
            );
        } else {
            debug!(
                key = %key,
                count = snapshot.count,
                limit = decision.limit,
                reset_seconds = decision.reset_seconds,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }
}

#[async_trait]
impl RateLimiterBackend for RateLimitEngine {
    fn is_known_type(&self, type_name: &str) -> bool {
        self.registry.is_known_type(type_name)
    }

    async fn decide(&self, subject: &str, type_name: &str) -> Result<RateLimitDecision> {
        RateLimitEngine::decide(self, subject, type_name).await
    }
}

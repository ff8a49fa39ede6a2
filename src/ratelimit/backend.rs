//! Rate limiter trait used by the admission layer.

use async_trait::async_trait;

use super::decision::RateLimitDecision;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The admission middleware depends on this rather than on
/// [`RateLimitEngine`](super::RateLimitEngine) directly, so it can be driven
/// by a stub in tests.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Whether a policy exists for the notification type.
    fn is_known_type(&self, type_name: &str) -> bool;

    /// Count one request for the subject and decide on it.
    async fn decide(&self, subject: &str, type_name: &str) -> Result<RateLimitDecision>;
}

//! Rate limiting policies and decision logic.

mod backend;
mod decision;
mod engine;
mod key;
mod policy;

pub use backend::RateLimiterBackend;
pub use decision::RateLimitDecision;
pub use engine::RateLimitEngine;
pub use key::{CounterKey, KEY_SEPARATOR};
pub use policy::{PolicyRegistry, PolicyRule, RateLimitPolicy};

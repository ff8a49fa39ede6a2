//! Gatekeeper - Distributed Notification Rate Limiting
//!
//! This crate enforces per-recipient, per-notification-type request quotas on
//! an HTTP endpoint. Counters live in a shared store (Redis) and are updated
//! with a single atomic operation, so the quota holds across every service
//! instance pointed at the same store.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;

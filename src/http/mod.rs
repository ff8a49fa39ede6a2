//! HTTP surface: admission middleware, handlers, and server.

pub mod admission;
mod handler;
mod server;

pub use admission::{admission_middleware, AdmissionGate, NotificationRequest, Rejection, Verdict};
pub use handler::NOTIFICATION_SENT_MESSAGE;
pub use server::{build_router, HttpServer};

//! Downstream request handlers.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use super::admission::{NotificationRequest, Rejection};

pub const NOTIFICATION_SENT_MESSAGE: &str = "Notification sent successfully.";

/// Accept a notification that passed admission. Delivery is a no-op.
///
/// The body is parsed the same way the admission gate parses it, so any
/// request the gate forwards is accepted regardless of its content type.
pub async fn send_notification(body: Bytes) -> Response {
    let Some(request) = NotificationRequest::parse(&body) else {
        return Rejection::MissingFields.into_response();
    };

    info!(
        recipient = %request.recipient,
        notification_type = %request.notification_type,
        "Notification accepted"
    );

    (StatusCode::OK, NOTIFICATION_SENT_MESSAGE).into_response()
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "OK"
}

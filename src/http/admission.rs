//! Admission control for the notification endpoint.
//!
//! [`AdmissionGate::evaluate`] turns a buffered request body into a
//! [`Verdict`] without any HTTP machinery. [`admission_middleware`] wraps it
//! for axum: it buffers the body, asks for a verdict, and either replays the
//! original body to the next handler or writes the rejection.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::FailurePolicy;
use crate::error::GatekeeperError;
use crate::ratelimit::{RateLimitDecision, RateLimiterBackend};

pub const MISSING_FIELDS_MESSAGE: &str = "Recipient and notification type are required.";
pub const INVALID_TYPE_MESSAGE: &str = "Invalid notification type.";
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded.";
pub const STORE_UNAVAILABLE_MESSAGE: &str = "Rate limit service unavailable.";
pub const UNREADABLE_BODY_MESSAGE: &str = "Request body could not be read.";

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// A notification request body with both required fields present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient: String,
    pub notification_type: String,
}

impl NotificationRequest {
    /// Parse and validate a raw body.
    ///
    /// The body must be a JSON object whose values are all strings, with
    /// non-empty `recipient` and `type` entries.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let mut fields: HashMap<String, String> = serde_json::from_slice(body).ok()?;

        let recipient = fields.remove("recipient").filter(|v| !v.is_empty())?;
        let notification_type = fields.remove("type").filter(|v| !v.is_empty())?;

        Some(Self {
            recipient,
            notification_type,
        })
    }
}

/// Why a request was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Body is not a JSON object with non-empty `recipient` and `type`
    MissingFields,
    /// Body could not be buffered
    UnreadableBody,
    /// No policy for the requested type
    InvalidType,
    /// Quota exhausted for the current window
    RateLimited(RateLimitDecision),
    /// Counter store failed under the fail-closed policy
    StoreUnavailable,
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::MissingFields => message(StatusCode::BAD_REQUEST, MISSING_FIELDS_MESSAGE),
            Rejection::UnreadableBody => message(StatusCode::BAD_REQUEST, UNREADABLE_BODY_MESSAGE),
            Rejection::InvalidType => message(StatusCode::BAD_REQUEST, INVALID_TYPE_MESSAGE),
            Rejection::StoreUnavailable => {
                message(StatusCode::SERVICE_UNAVAILABLE, STORE_UNAVAILABLE_MESSAGE)
            }
            Rejection::RateLimited(decision) => (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (HEADER_LIMIT, decision.limit.to_string()),
                    (HEADER_REMAINING, decision.remaining.to_string()),
                    (HEADER_RESET, decision.reset_seconds.to_string()),
                ],
                RATE_LIMITED_MESSAGE,
            )
                .into_response(),
        }
    }
}

/// Outcome of admission for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the original request to the next handler
    Forward,
    /// Answer immediately
    Respond(Rejection),
}

/// Rate limit gate for one path prefix.
pub struct AdmissionGate {
    backend: Arc<dyn RateLimiterBackend>,
    path_prefix: String,
    failure_policy: FailurePolicy,
    max_body_bytes: usize,
}

impl AdmissionGate {
    /// Default limit on buffered body size.
    pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

    pub fn new(
        backend: Arc<dyn RateLimiterBackend>,
        path_prefix: impl Into<String>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            backend,
            path_prefix: path_prefix.into(),
            failure_policy,
            max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Whether `path` falls under the gated prefix.
    ///
    /// Matching is case-insensitive and segment-aware: `/api/notification`
    /// covers `/api/notification/send` but not `/api/notifications`.
    pub fn matches_path(&self, path: &str) -> bool {
        let prefix = self.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }

        match path.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(prefix) => {
                matches!(path.as_bytes().get(prefix.len()), None | Some(b'/'))
            }
            _ => false,
        }
    }

    /// Decide on a request whose path matched the prefix.
    pub async fn evaluate(&self, body: &[u8]) -> Verdict {
        let Some(request) = NotificationRequest::parse(body) else {
            debug!("Rejecting request with missing recipient or type");
            return Verdict::Respond(Rejection::MissingFields);
        };

        if !self.backend.is_known_type(&request.notification_type) {
            debug!(notification_type = %request.notification_type, "Rejecting unknown notification type");
            return Verdict::Respond(Rejection::InvalidType);
        }

        match self
            .backend
            .decide(&request.recipient, &request.notification_type)
            .await
        {
            Ok(decision) if decision.allowed => Verdict::Forward,
            Ok(decision) => {
                warn!(
                    recipient = %request.recipient,
                    notification_type = %request.notification_type,
                    limit = decision.limit,
                    reset_seconds = decision.reset_seconds,
                    "Rate limit exceeded"
                );
                Verdict::Respond(Rejection::RateLimited(decision))
            }
            Err(GatekeeperError::UnknownType(_)) => Verdict::Respond(Rejection::InvalidType),
            Err(e) => match self.failure_policy {
                FailurePolicy::Open => {
                    warn!(error = %e, "Rate limit check failed, admitting request (fail-open)");
                    Verdict::Forward
                }
                FailurePolicy::Closed => {
                    warn!(error = %e, "Rate limit check failed, rejecting request (fail-closed)");
                    Verdict::Respond(Rejection::StoreUnavailable)
                }
            },
        }
    }
}

/// Axum middleware applying an [`AdmissionGate`].
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    if !gate.matches_path(request.uri().path()) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, gate.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to buffer request body");
            return Rejection::UnreadableBody.into_response();
        }
    };

    match gate.evaluate(&bytes).await {
        Verdict::Forward => next.run(Request::from_parts(parts, Body::from(bytes))).await,
        Verdict::Respond(rejection) => rejection.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use axum::routing::post;
    use axum::Router;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Backend returning a canned outcome and recording calls.
    struct StubBackend {
        outcome: Mutex<Option<Result<RateLimitDecision>>>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn returning(outcome: Result<RateLimitDecision>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateLimiterBackend for StubBackend {
        fn is_known_type(&self, type_name: &str) -> bool {
            type_name.eq_ignore_ascii_case("status")
        }

        async fn decide(&self, _subject: &str, _type_name: &str) -> Result<RateLimitDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .lock()
                .take()
                .expect("stub backend called more than once")
        }
    }

    fn decision(allowed: bool, remaining: u64, reset_seconds: u64) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            limit: 2,
            remaining,
            reset_seconds,
        }
    }

    fn app(backend: Arc<StubBackend>, policy: FailurePolicy) -> Router {
        let gate = Arc::new(AdmissionGate::new(backend, "/api/notification", policy));
        Router::new()
            .route("/api/notification/send", post(|body: String| async move { body }))
            .route("/other", post(|| async { "other" }))
            .layer(axum::middleware::from_fn_with_state(gate, admission_middleware))
    }

    fn post_request(uri: &str, body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const VALID_BODY: &str = r#"{ "recipient": "user@example.com", "type": "status" }"#;

    #[test]
    fn test_parse_valid_body() {
        let request = NotificationRequest::parse(VALID_BODY.as_bytes()).unwrap();
        assert_eq!(request.recipient, "user@example.com");
        assert_eq!(request.notification_type, "status");
    }

    #[test]
    fn test_parse_rejects_missing_empty_or_malformed() {
        for body in [
            r#"{"recipient": "alice"}"#,
            r#"{"type": "status"}"#,
            r#"{"recipient": "", "type": "status"}"#,
            r#"{"recipient": "alice", "type": ""}"#,
            r#"{"recipient": 42, "type": "status"}"#,
            r#"{"recipient": "alice", "type": "status", "priority": 1}"#,
            r#"["alice", "status"]"#,
            "42",
            r#""status""#,
            "null",
            "not json",
            "",
        ] {
            assert!(NotificationRequest::parse(body.as_bytes()).is_none(), "{}", body);
        }
    }

    #[test]
    fn test_parse_ignores_extra_string_fields() {
        let request = NotificationRequest::parse(
            br#"{"recipient": "alice", "type": "news", "channel": "email"}"#,
        )
        .unwrap();
        assert_eq!(request.recipient, "alice");
        assert_eq!(request.notification_type, "news");
    }

    #[tokio::test]
    async fn test_array_body_returns_400_without_store_access() {
        let backend = StubBackend::returning(Ok(decision(true, 1, 60)));
        let response = app(backend.clone(), FailurePolicy::Closed)
            .oneshot(post_request("/api/notification/send", r#"["alice", "status"]"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["message"], MISSING_FIELDS_MESSAGE);
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_path_matching() {
        let gate = AdmissionGate::new(
            StubBackend::returning(Ok(decision(true, 1, 60))),
            "/api/notification",
            FailurePolicy::Closed,
        );

        assert!(gate.matches_path("/api/notification"));
        assert!(gate.matches_path("/api/notification/send"));
        assert!(gate.matches_path("/API/Notification/send"));
        assert!(!gate.matches_path("/api/notifications"));
        assert!(!gate.matches_path("/api"));
        assert!(!gate.matches_path("/health"));
    }

    #[tokio::test]
    async fn test_allowed_request_is_forwarded_with_body() {
        let backend = StubBackend::returning(Ok(decision(true, 1, 60)));
        let response = app(backend.clone(), FailurePolicy::Closed)
            .oneshot(post_request("/api/notification/send", VALID_BODY))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(HEADER_LIMIT).is_none());
        assert_eq!(body_string(response).await, VALID_BODY);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_denied_request_returns_429_with_headers() {
        let backend = StubBackend::returning(Ok(decision(false, 0, 30)));
        let response = app(backend.clone(), FailurePolicy::Closed)
            .oneshot(post_request("/api/notification/send", VALID_BODY))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[HEADER_LIMIT], "2");
        assert_eq!(response.headers()[HEADER_REMAINING], "0");
        assert_eq!(response.headers()[HEADER_RESET], "30");
        assert_eq!(body_string(response).await, RATE_LIMITED_MESSAGE);
    }

    #[tokio::test]
    async fn test_missing_fields_returns_400_without_store_access() {
        let backend = StubBackend::returning(Ok(decision(true, 1, 60)));
        let response = app(backend.clone(), FailurePolicy::Closed)
            .oneshot(post_request("/api/notification/send", r#"{"recipient":"alice"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["message"], MISSING_FIELDS_MESSAGE);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_returns_400_without_store_access() {
        let backend = StubBackend::returning(Ok(decision(true, 1, 60)));
        let response = app(backend.clone(), FailurePolicy::Closed)
            .oneshot(post_request(
                "/api/notification/send",
                r#"{"recipient":"alice","type":"bogus"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["message"], INVALID_TYPE_MESSAGE);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_path_bypasses_gate() {
        let backend = StubBackend::returning(Ok(decision(false, 0, 30)));
        let response = app(backend.clone(), FailurePolicy::Closed)
            .oneshot(post_request("/other", "{{ definitely not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "other");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_fail_closed_returns_503() {
        let backend = StubBackend::returning(Err(GatekeeperError::Store(StoreError::Timeout(
            Duration::from_millis(250),
        ))));
        let response = app(backend, FailurePolicy::Closed)
            .oneshot(post_request("/api/notification/send", VALID_BODY))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["message"], STORE_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_store_failure_fail_open_forwards() {
        let backend = StubBackend::returning(Err(GatekeeperError::Store(
            StoreError::Unavailable("connection refused".to_string()),
        )));
        let response = app(backend, FailurePolicy::Open)
            .oneshot(post_request("/api/notification/send", VALID_BODY))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, VALID_BODY);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let backend = StubBackend::returning(Ok(decision(true, 1, 60)));
        let gate = Arc::new(
            AdmissionGate::new(backend.clone(), "/api/notification", FailurePolicy::Closed)
                .with_max_body_bytes(8),
        );
        let app = Router::new()
            .route("/api/notification/send", post(|| async { "sent" }))
            .layer(axum::middleware::from_fn_with_state(gate, admission_middleware));

        let response = app
            .oneshot(post_request("/api/notification/send", VALID_BODY))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.calls(), 0);
    }
}

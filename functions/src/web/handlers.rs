//! Webhook endpoint handlers.
//!
//! Every handler follows the same path:
//! 1. Authenticate the caller (failure → 403)
//! 2. Do the endpoint's work (failure → 500)
//! 3. Respond 200
//!
//! Exactly one response leaves each handler, on every path.

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::authenticate;
use crate::platform::Platform;
use crate::store::StoreError;
use crate::trip::record_trip;

pub const GREETING_MESSAGE: &str = "Hello from Firebase!";
pub const TRIP_RECORDED_MESSAGE: &str = "Alarm trip has been recorded.";
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized, my dude!";
pub const FAILURE_MESSAGE: &str = "Sorry, something broke.";

/// Header the deployed smoke client uses to name itself.
const CLIENT_ID_HEADER: &str = "x-client-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub platform: Platform,
}

impl AppState {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

/// Status and plain-text body of a handled request.
pub type Reply = (StatusCode, &'static str);

/// Failures after authentication. All of them render as a generic 500.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to record trip: {0}")]
    RecordTrip(#[from] StoreError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        error!(error = %self, "handler_failed");
        (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE).into_response()
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Webhooks
// =============================================================================

fn log_received(endpoint: &'static str, method: &Method, headers: &HeaderMap) {
    info!(
        endpoint = endpoint,
        method = %method,
        client_id = headers.get(CLIENT_ID_HEADER).and_then(|v| v.to_str().ok()).unwrap_or(""),
        "webhook_received"
    );
}

fn unauthorized(endpoint: &'static str) -> Reply {
    warn!(endpoint = endpoint, "webhook_unauthorized");
    (StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE)
}

/// Greeting endpoint.
pub async fn hello_world(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Reply, HandlerError> {
    log_received("helloWorld", &method, &headers);

    let auth = authenticate(state.platform.verifier.as_ref(), &headers).await;
    if !auth.success() {
        return Ok(unauthorized("helloWorld"));
    }

    Ok((StatusCode::OK, GREETING_MESSAGE))
}

/// Alarm trip endpoint.
///
/// Sends the trip notification (best effort) and records the trip event.
/// A failed record is a 500, so the caller cannot tell whether it stuck.
pub async fn trip_alarm(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Reply, HandlerError> {
    log_received("tripAlarm", &method, &headers);

    let auth = authenticate(state.platform.verifier.as_ref(), &headers).await;
    let Some(identity) = auth.into_identity() else {
        return Ok(unauthorized("tripAlarm"));
    };

    let receipt = record_trip(&state.platform).await?;

    info!(uid = %identity.uid, document = %receipt.0, "trip_alarm_handled");

    Ok((StatusCode::OK, TRIP_RECORDED_MESSAGE))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Request},
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{identity, platform, FakeNotifier, FakeStore, FakeVerifier};
    use crate::web::router;

    struct Harness {
        app: Router,
        verifier: Arc<FakeVerifier>,
        notifier: Arc<FakeNotifier>,
        store: Arc<FakeStore>,
    }

    fn harness(notifier: FakeNotifier, store: FakeStore) -> Harness {
        let verifier = Arc::new(FakeVerifier::accepting("valid-token", identity("bugs")));
        let notifier = Arc::new(notifier);
        let store = Arc::new(store);
        let app = router(AppState::new(platform(
            verifier.clone(),
            notifier.clone(),
            store.clone(),
        )));
        Harness {
            app,
            verifier,
            notifier,
            store,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, auth: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CLIENT_ID_HEADER, "Bugs");
        if let Some(auth) = auth {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_hello_world_without_authorization() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        let reply = send(&h.app, "GET", "/helloWorld", None).await;

        assert_eq!(reply, (StatusCode::FORBIDDEN, "Unauthorized, my dude!".to_string()));
        assert_eq!(h.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_hello_world_invalid_token() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        let reply = send(&h.app, "GET", "/helloWorld", Some("Bearer invalid-token")).await;

        assert_eq!(reply, (StatusCode::FORBIDDEN, "Unauthorized, my dude!".to_string()));
        assert_eq!(h.verifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_hello_world_valid_token() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        let reply = send(&h.app, "GET", "/helloWorld", Some("Bearer valid-token")).await;

        assert_eq!(reply, (StatusCode::OK, "Hello from Firebase!".to_string()));
    }

    #[tokio::test]
    async fn test_hello_world_accepts_any_method() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        for method in ["POST", "PUT", "DELETE"] {
            let reply = send(&h.app, method, "/helloWorld", Some("Bearer valid-token")).await;
            assert_eq!(reply.0, StatusCode::OK, "{method} should be accepted");
        }
    }

    #[tokio::test]
    async fn test_trip_alarm_unauthorized_does_nothing() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        let reply = send(&h.app, "POST", "/tripAlarm", Some("Token valid-token")).await;

        assert_eq!(reply, (StatusCode::FORBIDDEN, "Unauthorized, my dude!".to_string()));
        assert!(h.notifier.published().is_empty());
        assert!(h.store.appended().is_empty());
    }

    #[tokio::test]
    async fn test_trip_alarm_records_trip() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        let reply = send(&h.app, "POST", "/tripAlarm", Some("Bearer valid-token")).await;

        assert_eq!(reply, (StatusCode::OK, "Alarm trip has been recorded.".to_string()));
        let published = h.notifier.published();
        let appended = h.store.appended();
        assert_eq!(published.len(), 1);
        assert_eq!(appended.len(), 1);
        assert_eq!(published[0].0, "trips");
        assert_eq!(published[0].1.body, appended[0].1.time);
    }

    #[tokio::test]
    async fn test_trip_alarm_notification_failure_still_records() {
        let h = harness(FakeNotifier::failing(), FakeStore::ok());

        let reply = send(&h.app, "GET", "/tripAlarm", Some("Bearer valid-token")).await;

        assert_eq!(reply, (StatusCode::OK, "Alarm trip has been recorded.".to_string()));
        assert_eq!(h.store.appended().len(), 1);
    }

    #[tokio::test]
    async fn test_trip_alarm_store_failure_is_500() {
        let h = harness(FakeNotifier::ok(), FakeStore::failing());

        let reply = send(&h.app, "POST", "/tripAlarm", Some("Bearer valid-token")).await;

        assert_eq!(
            reply,
            (StatusCode::INTERNAL_SERVER_ERROR, "Sorry, something broke.".to_string())
        );
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let h = harness(FakeNotifier::ok(), FakeStore::ok());

        let reply = send(&h.app, "GET", "/health", None).await;

        assert_eq!(reply, (StatusCode::OK, r#"{"status":"ok"}"#.to_string()));
    }
}

//! Web server module for the authenticated webhook endpoints.
//!
//! This module provides:
//! - `/helloWorld`: authenticated greeting
//! - `/tripAlarm`: authenticated alarm trip (notify + record)
//! - `/health`: unauthenticated liveness probe
//!
//! Both webhooks accept any HTTP method and require
//! `Authorization: Bearer <Firebase ID token>`.

pub mod handlers;

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

pub use handlers::{
    health, hello_world, trip_alarm, AppState, HandlerError, HealthResponse, Reply, FAILURE_MESSAGE,
    GREETING_MESSAGE, TRIP_RECORDED_MESSAGE, UNAUTHORIZED_MESSAGE,
};

/// Build the service router.
pub fn router(state: AppState) -> Router {
    with_service_layers(
        Router::new()
            .route("/health", get(health))
            .route("/helloWorld", any(hello_world))
            .route("/tripAlarm", any(trip_alarm)),
    )
    .with_state(state)
}

/// Tracing, and a 500 for any handler that panics.
fn with_service_layers<S>(routes: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    error!(panic = %detail, "handler_panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE).into_response()
}

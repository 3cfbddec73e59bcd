use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use donor_match::matching::{
    matching_router, AuditGateway, MatchingService, NotificationGateway, ProfileStore,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4";

pub(crate) fn with_matching_routes<S, N, A>(service: Arc<MatchingService<S, N, A>>) -> axum::Router
where
    S: ProfileStore + 'static,
    N: NotificationGateway + 'static,
    A: AuditGateway + 'static,
{
    matching_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// 503 until the listener is bound and the profile store is seeded.
pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let (status, label) = if state.readiness.load(Ordering::Acquire) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "initializing")
    };
    (status, Json(json!({ "status": label })))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([(header::CONTENT_TYPE, PROMETHEUS_TEXT)], body)
}

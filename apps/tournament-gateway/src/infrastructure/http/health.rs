//! Health Check and Metrics Endpoints
//!
//! Used by container orchestrators, load balancers and monitoring.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use super::controller::AppState;
use super::response::{HealthResponse, StreamsStatus};
use crate::infrastructure::metrics::get_metrics_handle;

pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_health_response(&state)))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler() -> impl IntoResponse {
    // Upstream feeds are opened on demand, so there is nothing to wait for.
    (StatusCode::OK, "READY")
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let summary = state.registry.summary();

    HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        streams: StreamsStatus {
            active: summary.active,
            subscribers: summary.subscribers,
            upstream_connected: summary.upstream_connected,
            details: state.registry.stats(),
        },
    }
}

//! Readiness probe.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use cantus_core::ports::{EngineHealth, QueueStats};

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct StoreHealth {
    reachable: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: EngineHealth,
    store: StoreHealth,
    queue: QueueStats,
    shutting_down: bool,
}

/// `GET /health`
///
/// 200 when the model is loaded and the store answers; 503 otherwise
/// (and during shutdown), so load balancers drain before the listener
/// goes away.
pub async fn health(State(state): State<AppState>) -> Response {
    let engine = state.synthesizer.health().await;
    let store_reachable = state.jobs.ping().await.is_ok();
    let shutting_down = state.is_shutting_down();

    let healthy = engine.model_loaded && store_reachable && !shutting_down;
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        engine,
        store: StoreHealth {
            reachable: store_reachable,
        },
        queue: state.queue.stats(),
        shutting_down,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

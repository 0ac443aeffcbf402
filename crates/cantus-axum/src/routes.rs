//! Route definitions and router construction.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use cantus_core::validation::MAX_UPLOAD_BYTES;

use crate::handlers;
use crate::request_id;
use crate::state::AppState;

/// Multipart framing overhead allowance on top of the audio payload cap.
const UPLOAD_BODY_SLACK: usize = 64 * 1024;

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let upload_timeout = state.settings.upload_timeout;

    Router::new()
        // Jobs API
        .route("/jobs", post(handlers::jobs::create).get(handlers::jobs::list))
        .route(
            "/jobs/{id}",
            get(handlers::jobs::get).delete(handlers::jobs::remove),
        )
        .route("/jobs/{id}/formats", get(handlers::jobs::formats))
        .route("/jobs/{id}/download", get(handlers::jobs::download))
        // Voice profiles API
        .route(
            "/voices/clone",
            post(handlers::voices::clone_voice)
                .layer::<_, std::convert::Infallible>(TimeoutLayer::new(upload_timeout))
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES as usize + UPLOAD_BODY_SLACK)),
        )
        .route("/voices", get(handlers::voices::list))
        .route(
            "/voices/{id}",
            get(handlers::voices::get).delete(handlers::voices::remove),
        )
        // Quality profiles API
        .route(
            "/quality-profiles",
            post(handlers::quality_profiles::create).get(handlers::quality_profiles::list),
        )
        .route(
            "/quality-profiles/{id}",
            get(handlers::quality_profiles::get)
                .patch(handlers::quality_profiles::update)
                .delete(handlers::quality_profiles::remove),
        )
        .route(
            "/quality-profiles/{id}/duplicate",
            post(handlers::quality_profiles::duplicate),
        )
        .route(
            "/quality-profiles/{id}/set-default",
            post(handlers::quality_profiles::set_default),
        )
        // Health
        .route("/health", get(handlers::health::health))
        .layer(middleware::from_fn(request_id::stamp_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

//! Web API router construction.

use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::{feedback, recommendations, status};

/// Creates the web server router.
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/recommendations", post(recommendations::recommend))
        .route(
            "/recommendations/advanced",
            post(recommendations::recommend_advanced),
        )
        .route("/feedback", post(feedback::submit_feedback))
        .with_state(app_state);

    Router::new().nest("/api", api_router).layer((
        CompressionLayer::new()
            .zstd(true)
            .br(true)
            .gzip(true)
            .quality(tower_http::CompressionLevel::Fastest),
        TimeoutLayer::new(Duration::from_secs(30)),
    ))
}

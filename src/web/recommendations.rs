//! Recommendation request handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine;
use crate::engine::types::{RecommendOptions, RecommendationList, StudentProfile};
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    #[serde(flatten)]
    pub profile: StudentProfile,
    #[serde(default)]
    pub options: RecommendOptions,
}

/// `POST /api/recommendations`
pub(super) async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendationList>, ApiError> {
    handle(state, request, false).await
}

/// `POST /api/recommendations/advanced`
///
/// Same pipeline as the standard endpoint with the score breakdown attached;
/// equivalence between the two paths holds by construction.
pub(super) async fn recommend_advanced(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendationList>, ApiError> {
    handle(state, request, true).await
}

async fn handle(
    state: AppState,
    request: RecommendRequest,
    advanced: bool,
) -> Result<Json<RecommendationList>, ApiError> {
    if request.profile.subjects.is_empty() {
        return Err(ApiError::bad_request("At least one A-level subject is required"));
    }

    let mut options = request.options;
    options.advanced = options.advanced || advanced;
    options.limit = options.limit.clamp(1, 100);

    let config = state.engine_config().await;
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let list = engine::recommend(&state.db_pool, config, &request.profile, options, &cancel).await?;

    info!(
        user_id = request.profile.user_id,
        returned = list.recommendations.len(),
        advanced = options.advanced,
        elapsed = fmt_duration(started.elapsed()),
        "recommendations served"
    );
    Ok(Json(list))
}

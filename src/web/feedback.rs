//! Feedback submission handler.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::engine;
use crate::engine::types::FeedbackKind;
use crate::state::AppState;
use crate::web::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub user_id: i64,
    pub course_id: i32,
    pub kind: FeedbackKind,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /api/feedback`
pub(super) async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    engine::submit_feedback(
        &state.db_pool,
        request.user_id,
        request.course_id,
        request.kind,
        request.notes.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "ok": true })))
}

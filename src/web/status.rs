//! Health and status handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{trace, warn};

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    status: &'static str,
    version: String,
    database: &'static str,
}

/// `GET /api/health`
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// `GET /api/status`
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
    {
        Ok(_) => "connected",
        Err(e) => {
            warn!(error = %e, "DB health check failed");
            "error"
        }
    };

    Json(StatusResponse {
        status: if database == "connected" { "active" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

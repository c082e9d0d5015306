use axum::extract::State;
use axum::Json;
use serde_json::{json, Value as JsonValue};
use tracing::warn;

use crate::db;
use crate::error::ApiError;
use crate::state::SharedState;

pub async fn health(State(state): State<SharedState>) -> Result<Json<JsonValue>, ApiError> {
    if let Err(e) = db::ping(&state.pool).await {
        warn!("health: database ping failed: {e}");
        return Err(ApiError::Unavailable);
    }
    Ok(Json(json!({ "status": "ok", "database": "ok" })))
}

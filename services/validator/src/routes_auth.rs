use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{CurrentUser, IssuedToken, User};
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

pub async fn post_token(
    State(state): State<SharedState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<IssuedToken>, ApiError> {
    let Json(req) = body.map_err(|rej| ApiError::Validation(vec![rej.body_text()]))?;

    let user = state.auth.authenticate(&req.username, &req.password).map_err(|e| {
        warn!(username=%req.username, "auth: login rejected");
        ApiError::from(e)
    })?;
    info!(username=%user.username, "auth: token issued");
    Ok(Json(state.auth.issue_token(&user.username, Utc::now())))
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}


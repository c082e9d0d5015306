use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::cache::{key_problems_list, key_validation, PROBLEMS_LIST_TTL, VALIDATION_TTL};
use crate::error::ApiError;
use crate::problem::ProblemStatement;
use crate::rate_limit::RateGroup;
use crate::result_store::StoredResult;
use crate::state::SharedState;
use crate::types_tasks::TaskStatus;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationAccepted {
    pub request_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequestStatus {
    pub request_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StoredResult>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    pub message: String,
}

pub async fn post_validate(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ProblemStatement>, JsonRejection>,
) -> Result<(StatusCode, Json<ValidationAccepted>), ApiError> {
    state.limits.check(RateGroup::Validate, &user.username)?;

    let Json(problem) = body.map_err(|rej| ApiError::Validation(vec![rej.body_text()]))?;
    let problem = problem.validate().map_err(ApiError::Validation)?;

    let task = state.tasks.enqueue(&problem).await?;
    state.metrics.record_validation_request();
    info!(task_id=%task.id, user=%user.username, "validate: accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(ValidationAccepted { request_id: task.id, status: task.status, created_at: task.created_at }),
    ))
}

/// Cache, then stored results, then the task table.
pub async fn get_validation(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ValidationRequestStatus>, ApiError> {
    state.limits.check(RateGroup::Status, &user.username)?;
    let Path(id) = id.map_err(|rej| ApiError::BadRequest(rej.body_text()))?;

    let key = key_validation(id);
    if let Some(cached) = state.cache.get(&key).await {
        if let Ok(status) = serde_json::from_value::<ValidationRequestStatus>(cached) {
            return Ok(Json(status));
        }
    }

    let task = state.tasks.get(id).await?;

    if let Some(result) = state.results.get_result(id).await? {
        let status = ValidationRequestStatus {
            request_id: id,
            status: TaskStatus::Completed,
            created_at: task.as_ref().map(|t| t.created_at).unwrap_or(result.timestamp),
            completed_at: Some(result.timestamp),
            error: None,
            result: Some(result),
        };
        cache_completed(&state, id, serde_json::to_value(&status)?).await?;
        return Ok(Json(status));
    }

    let task = task.ok_or_else(|| ApiError::NotFound(format!("Validation request {id} not found")))?;
    Ok(Json(ValidationRequestStatus {
        request_id: id,
        status: task.status,
        created_at: task.created_at,
        completed_at: task.completed_at,
        error: task.error.filter(|_| task.status == TaskStatus::Failed),
        result: None,
    }))
}

/// Caches a completed status, then re-reads the result row. A DELETE that
/// commits between our read and the `set` would otherwise leave the deleted
/// result cached after its invalidation already ran.
pub async fn cache_completed(state: &SharedState, id: Uuid, status: JsonValue) -> Result<(), ApiError> {
    let key = key_validation(id);
    state.cache.set(key.clone(), status, VALIDATION_TTL).await;
    if state.results.get_result(id).await?.is_none() {
        state.cache.delete(&key).await;
    }
    Ok(())
}

pub async fn list_problems(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    state.limits.check(RateGroup::List, &user.username)?;
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    let key = key_problems_list(limit);
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(Json(cached));
    }

    let results = state.results.list_results(limit).await?;
    let value = serde_json::to_value(&results)?;
    state.cache.set(key, value.clone(), PROBLEMS_LIST_TTL).await;
    Ok(Json(value))
}

pub async fn delete_problem(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Path(id) = id.map_err(|rej| ApiError::BadRequest(rej.body_text()))?;

    let existed = state.results.delete_problem(id).await?;
    state.cache.invalidate_problem(id).await;

    if !existed {
        return Err(ApiError::NotFound(format!("Problem {id} not found")));
    }
    info!(problem_id=%id, user=%user.username, "problems: deleted");
    Ok(Json(DeleteResponse { status: "success".into(), message: format!("Problem {id} deleted successfully") }))
}

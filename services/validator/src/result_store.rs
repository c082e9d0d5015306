use chrono::{DateTime, Utc};
use scoring::{Post, ValidationReport};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{from_millis, parse_id, to_millis, StoreError};

/// A finished validation as persisted and served by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredResult {
    pub problem_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ValidationReport,
    pub relevant_posts: Vec<Post>,
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    problem_id: String,
    timestamp: i64,
    report: String,
    relevant_posts: String,
}

impl TryFrom<ResultRow> for StoredResult {
    type Error = StoreError;

    fn try_from(r: ResultRow) -> Result<Self, StoreError> {
        Ok(StoredResult {
            problem_id: parse_id(&r.problem_id)?,
            timestamp: from_millis(r.timestamp)?,
            report: serde_json::from_str(&r.report)?,
            relevant_posts: serde_json::from_str(&r.relevant_posts)?,
        })
    }
}

#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the result for `problem_id`.
    pub async fn store_result(&self, result: &StoredResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO validation_results (problem_id, timestamp, report, relevant_posts)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(problem_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                report = excluded.report,
                relevant_posts = excluded.relevant_posts
            "#,
        )
        .bind(result.problem_id.to_string())
        .bind(to_millis(result.timestamp))
        .bind(serde_json::to_string(&result.report)?)
        .bind(serde_json::to_string(&result.relevant_posts)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert that only lands while the task row for `problem_id` still
    /// exists. Returns false when the problem was deleted mid-run.
    pub async fn store_for_task(&self, result: &StoredResult) -> Result<bool, StoreError> {
        let id = result.problem_id.to_string();
        let res = sqlx::query(
            r#"
            INSERT INTO validation_results (problem_id, timestamp, report, relevant_posts)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM validation_tasks WHERE id = ?)
            ON CONFLICT(problem_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                report = excluded.report,
                relevant_posts = excluded.relevant_posts
            "#,
        )
        .bind(&id)
        .bind(to_millis(result.timestamp))
        .bind(serde_json::to_string(&result.report)?)
        .bind(serde_json::to_string(&result.relevant_posts)?)
        .bind(&id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn get_result(&self, problem_id: Uuid) -> Result<Option<StoredResult>, StoreError> {
        let row: Option<ResultRow> = sqlx::query_as(
            r#"SELECT problem_id, timestamp, report, relevant_posts FROM validation_results WHERE problem_id = ?"#,
        )
        .bind(problem_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredResult::try_from).transpose()
    }

    /// Newest first.
    pub async fn list_results(&self, limit: i64) -> Result<Vec<StoredResult>, StoreError> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT problem_id, timestamp, report, relevant_posts
            FROM validation_results
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StoredResult::try_from).collect()
    }

    pub async fn delete_result(&self, problem_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM validation_results WHERE problem_id = ?")
            .bind(problem_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Removes the result, the task and its events in one transaction, so a
    /// worker finishing concurrently either sees the task or sees nothing.
    /// Returns whether anything existed.
    pub async fn delete_problem(&self, problem_id: Uuid) -> Result<bool, StoreError> {
        let id = problem_id.to_string();
        let mut tx = self.pool.begin().await?;
        let results = sqlx::query("DELETE FROM validation_results WHERE problem_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM validation_task_events WHERE task_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        let tasks = sqlx::query("DELETE FROM validation_tasks WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(results.rows_affected() + tasks.rows_affected() > 0)
    }
}

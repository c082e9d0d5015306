use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{from_millis, parse_id, to_millis, StoreError};
use crate::events::append_event_tx;
use crate::problem::ProblemStatement;
use crate::types_tasks::{TaskEvent, TaskRecord, TaskStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
struct TaskRow {
    id: String,
    status: String,
    problem: String,
    attempts: i64,
    error: Option<String>,
    not_before: i64,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = StoreError;

    fn try_from(r: TaskRow) -> Result<Self, StoreError> {
        Ok(TaskRecord {
            id: parse_id(&r.id)?,
            status: TaskStatus::parse(&r.status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown status {:?}", r.status)))?,
            problem: serde_json::from_str(&r.problem)?,
            attempts: r.attempts,
            error: r.error,
            not_before: from_millis(r.not_before)?,
            created_at: from_millis(r.created_at)?,
            updated_at: from_millis(r.updated_at)?,
            completed_at: r.completed_at.map(from_millis).transpose()?,
        })
    }
}

const COLUMNS: &str = "id, status, problem, attempts, error, not_before, created_at, updated_at, completed_at";

/// Durable queue of validation tasks.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, problem: &ProblemStatement) -> Result<TaskRecord, StoreError> {
        let id = Uuid::new_v4();
        let now = to_millis(Utc::now());
        let body = serde_json::to_string(problem)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO validation_tasks (id, status, problem, attempts, not_before, created_at, updated_at)
            VALUES (?, 'pending', ?, 0, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(body)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        append_event_tx(&mut tx, id, &TaskEvent::Enqueued).await?;
        tx.commit().await?;

        info!(task_id=%id, "task_store: enqueued");
        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Claims the oldest runnable pending task: moves it to `processing` and
    /// bumps `attempts` in a single statement.
    pub async fn claim_next(&self) -> Result<Option<TaskRecord>, StoreError> {
        let now = to_millis(Utc::now());
        let sql = format!(
            r#"
            UPDATE validation_tasks
            SET status = 'processing', attempts = attempts + 1, updated_at = ?
            WHERE id = (
                SELECT id FROM validation_tasks
                WHERE status = 'pending' AND not_before <= ?
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        );
        let row: Option<TaskRow> = sqlx::query_as(&sql).bind(now).bind(now).fetch_optional(&self.pool).await?;
        row.map(TaskRecord::try_from).transpose()
    }

    pub async fn complete(&self, id: Uuid, posts: usize) -> Result<(), StoreError> {
        self.transition(id, TaskStatus::Completed, None, Duration::ZERO, TaskEvent::Completed { posts })
            .await
    }

    /// Sends a processing task back to `pending`, runnable after `delay`.
    pub async fn retry_later(&self, id: Uuid, attempt: i64, error: &str, delay: Duration) -> Result<(), StoreError> {
        let ev = TaskEvent::Retry { attempt, error: error.to_string(), delay_secs: delay.as_secs() };
        self.transition(id, TaskStatus::Pending, Some(error), delay, ev).await
    }

    pub async fn fail(&self, id: Uuid, attempt: i64, error: &str) -> Result<(), StoreError> {
        let ev = TaskEvent::Failed { attempt, error: error.to_string() };
        self.transition(id, TaskStatus::Failed, Some(error), Duration::ZERO, ev).await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: TaskStatus,
        error: Option<&str>,
        delay: Duration,
        event: TaskEvent,
    ) -> Result<(), StoreError> {
        let from = TaskStatus::Processing;
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { id, from, to });
        }

        let now = Utc::now();
        let not_before = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let completed_at = to.is_terminal().then(|| to_millis(now));

        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            UPDATE validation_tasks
            SET status = ?, error = ?, not_before = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(error)
        .bind(to_millis(not_before))
        .bind(completed_at)
        .bind(to_millis(now))
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.get(id).await? {
                Some(cur) => Err(StoreError::InvalidTransition { id, from: cur.status, to }),
                None => Err(StoreError::NotFound(id)),
            };
        }

        append_event_tx(&mut tx, id, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM validation_tasks WHERE id = ?");
        let row: Option<TaskRow> = sqlx::query_as(&sql).bind(id.to_string()).fetch_optional(&self.pool).await?;
        row.map(TaskRecord::try_from).transpose()
    }

    /// Removes the task and its events. Returns whether the task existed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM validation_task_events WHERE task_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM validation_tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    /// Startup recovery: tasks a previous process left in `processing` go back
    /// to `pending`, or to `failed` once their attempt budget is spent.
    pub async fn recover_interrupted(&self, max_attempts: i64) -> Result<usize, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM validation_tasks WHERE status = 'processing'");
        let rows: Vec<TaskRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut recovered = 0;
        for row in rows {
            let task = TaskRecord::try_from(row)?;
            let res = if task.attempts < max_attempts {
                self.retry_later(task.id, task.attempts, "interrupted by restart", Duration::ZERO).await
            } else {
                self.fail(task.id, task.attempts, "interrupted by restart; attempts exhausted").await
            };
            match res {
                Ok(()) => recovered += 1,
                Err(e) => warn!(task_id=%task.id, "recover: {e}"),
            }
        }
        if recovered > 0 {
            info!(recovered, "task_store: recovered interrupted tasks");
        }
        Ok(recovered)
    }
}

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::db::StoreError;
use crate::types_tasks::TaskEvent;

pub async fn append_event(pool: &SqlitePool, task_id: Uuid, event: &TaskEvent) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    append_event_tx(&mut tx, task_id, event).await?;
    tx.commit().await?;
    Ok(())
}

/// Appends inside a caller's transaction so the event commits with the state change it records.
pub async fn append_event_tx(
    tx: &mut Transaction<'_, Sqlite>,
    task_id: Uuid,
    event: &TaskEvent,
) -> Result<(), StoreError> {
    let body = serde_json::to_string(event)?;
    sqlx::query(r#"INSERT INTO validation_task_events (task_id, event, created_at) VALUES (?, ?, ?)"#)
        .bind(task_id.to_string())
        .bind(body)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut **tx)
        .await?;
    debug!(task_id=%task_id, kind = event.kind(), "events: appended");
    Ok(())
}

/// Events for one task, oldest first.
pub async fn list_events(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<JsonValue>, StoreError> {
    let rows: Vec<(String,)> =
        sqlx::query_as(r#"SELECT event FROM validation_task_events WHERE task_id = ? ORDER BY id ASC"#)
            .bind(task_id.to_string())
            .fetch_all(pool)
            .await?;

    rows.into_iter()
        .map(|(raw,)| serde_json::from_str(&raw).map_err(StoreError::from))
        .collect()
}

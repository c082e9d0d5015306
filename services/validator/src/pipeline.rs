use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::collector::collect_for_problem;
use crate::result_store::StoredResult;
use crate::state::SharedState;
use crate::types_tasks::TaskRecord;

/// Collect, score, persist. Any error here is retryable from the worker's
/// point of view. `None` means the problem was deleted while this run was in
/// flight and nothing was stored.
pub async fn run_validation(state: &SharedState, task: &TaskRecord) -> Result<Option<StoredResult>> {
    let cfg = state.collect_config();
    let posts = collect_for_problem(state.collector.as_ref(), &task.problem.keywords, &cfg)
        .await
        .context("collecting posts")?;
    info!(task_id=%task.id, posts = posts.len(), "pipeline: collected");

    let report = state.scorer.score(&posts).await.context("scoring posts")?;
    info!(
        task_id=%task.id,
        validation_score = report.validation_score,
        confidence_score = report.confidence_score,
        "pipeline: scored"
    );

    let result = StoredResult { problem_id: task.id, timestamp: Utc::now(), report, relevant_posts: posts };
    state.metrics.record_validation_score(result.report.validation_score);

    let stored = state.results.store_for_task(&result).await.context("storing result")?;
    if !stored {
        info!(task_id=%task.id, "pipeline: problem deleted mid-run, result dropped");
        return Ok(None);
    }
    state.cache.invalidate_problem(task.id).await;
    Ok(Some(result))
}

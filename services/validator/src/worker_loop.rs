use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db::StoreError;
use crate::events::append_event;
use crate::pipeline::run_validation;
use crate::state::SharedState;
use crate::types_tasks::{TaskEvent, TaskRecord};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub max_attempts: i64,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Retried,
    Failed,
    /// The problem was deleted while the task ran.
    Discarded,
}

pub async fn run_worker_loop(state: SharedState, settings: WorkerSettings, cancel: CancellationToken) {
    info!(concurrency = settings.concurrency, "worker_loop: started");
    let permits = Arc::new(Semaphore::new(settings.concurrency));

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            p = permits.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        match state.tasks.claim_next().await {
            Ok(Some(task)) => {
                let st = state.clone();
                let s = settings.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let task_id = task.id;
                    if let Err(e) = process_task(&st, task, &s).await {
                        error!(task_id=%task_id, "worker: task bookkeeping failed: {e:?}");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                idle(&cancel, settings.poll_interval).await;
            }
            Err(e) => {
                drop(permit);
                warn!("worker_loop: claim failed: {e}");
                idle(&cancel, settings.poll_interval).await;
            }
        }
    }

    // let in-flight tasks finish
    let _ = permits.acquire_many(settings.concurrency as u32).await;
    info!("worker_loop: stopped");
}

async fn idle(cancel: &CancellationToken, d: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = sleep(d) => {}
    }
}

/// Runs one claimed task to its next state. Pipeline errors and failed
/// completion writes are folded into a retry or a terminal failure, so the
/// task never stays `processing`. Only a failure to record that outcome is
/// returned.
pub async fn process_task(state: &SharedState, task: TaskRecord, settings: &WorkerSettings) -> Result<TaskOutcome> {
    let outcome = run_task(state, task, settings).await?;
    state.metrics.record_task_outcome(outcome);
    Ok(outcome)
}

async fn run_task(state: &SharedState, task: TaskRecord, settings: &WorkerSettings) -> Result<TaskOutcome> {
    info!(task_id=%task.id, attempt = task.attempts, "worker: starting task");
    if let Err(e) = append_event(&state.pool, task.id, &TaskEvent::Start { attempt: task.attempts }).await {
        warn!(task_id=%task.id, "worker: start event not recorded: {e}");
    }

    let failure = match run_validation(state, &task).await {
        Ok(Some(result)) => match state.tasks.complete(task.id, result.relevant_posts.len()).await {
            Ok(()) => {
                info!(task_id=%task.id, "worker: task completed");
                return Ok(TaskOutcome::Completed);
            }
            Err(StoreError::NotFound(_)) => return Ok(discarded(&task)),
            Err(e) => anyhow::Error::new(e).context("recording completion"),
        },
        Ok(None) => return Ok(discarded(&task)),
        Err(e) => e,
    };

    let msg = format!("{failure:#}");
    let (outcome, recorded) = if task.attempts < settings.max_attempts {
        (TaskOutcome::Retried, state.tasks.retry_later(task.id, task.attempts, &msg, settings.retry_delay).await)
    } else {
        (TaskOutcome::Failed, state.tasks.fail(task.id, task.attempts, &msg).await)
    };

    match recorded {
        Ok(()) if outcome == TaskOutcome::Retried => {
            warn!(task_id=%task.id, attempt = task.attempts, error = %msg, "worker: task will retry");
            Ok(outcome)
        }
        Ok(()) => {
            error!(task_id=%task.id, attempt = task.attempts, error = %msg, "worker: task failed");
            Ok(outcome)
        }
        Err(StoreError::NotFound(_)) => Ok(discarded(&task)),
        Err(e) => Err(anyhow::Error::new(e).context(format!("recording outcome after: {msg}"))),
    }
}

fn discarded(task: &TaskRecord) -> TaskOutcome {
    info!(task_id=%task.id, "worker: task deleted while running");
    TaskOutcome::Discarded
}

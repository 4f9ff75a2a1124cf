//! Routes completed task runs to webhook events.

use std::sync::Arc;

use folio_scheduler::{TaskKind, TaskRun};
use folio_webhooks::{WebhookDispatcher, WebhookEvent};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Event announcing `run`, if it is one subscribers care about: a
/// successful backup or any failure.
pub fn event_for(run: &TaskRun) -> Option<(WebhookEvent, Value)> {
    let task = &run.task;
    if !run.outcome.is_success() {
        return Some((
            WebhookEvent::TaskFailed,
            json!({
                "taskId": task.id,
                "name": task.name,
                "type": task.kind,
                "trigger": run.trigger,
                "error": run.outcome.error,
                "durationMs": run.outcome.duration_ms,
            }),
        ));
    }
    if task.kind == TaskKind::Backup {
        return Some((
            WebhookEvent::BackupCreated,
            json!({
                "taskId": task.id,
                "name": task.name,
                "file": run.outcome.output,
                "durationMs": run.outcome.duration_ms,
            }),
        ));
    }
    None
}

/// Drain `runs` until every sender is gone, emitting one event per
/// interesting run.
pub fn spawn_router(
    mut runs: mpsc::Receiver<TaskRun>,
    dispatcher: Arc<WebhookDispatcher>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(run) = runs.recv().await {
            match event_for(&run) {
                Some((event, payload)) => {
                    dispatcher.emit(event, payload);
                }
                None => debug!(task_id = %run.task.id, "run produced no event"),
            }
        }
    })
}

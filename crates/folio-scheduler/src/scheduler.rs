use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use folio_core::config::SchedulerConfig;
use folio_core::time::now;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    cron::CronSchedule,
    error::{Result, SchedulerError, TaskError},
    executor::ExecutorRegistry,
    store::{NextRun, TaskStore},
    types::{NewTask, RunResult, RunTrigger, ScheduledTask, TaskKind, TaskOutcome, TaskRun, TaskStatus},
};

/// Counts for one pass over the due tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due but already executing (manual run or a previous tick).
    pub skipped: usize,
}

/// Owns task lifecycle and execution.
///
/// Shared as `Arc<Scheduler>` between the HTTP layer (CRUD, manual runs)
/// and the [`crate::SchedulerEngine`] (ticks). A task never executes twice
/// concurrently: a manual run of a running task is refused and a tick skips
/// it, leaving it due for the next tick.
pub struct Scheduler {
    store: TaskStore,
    executors: Arc<ExecutorRegistry>,
    task_timeout: Duration,
    running: Arc<Mutex<HashSet<String>>>,
    ticking: AtomicBool,
    runs_tx: Option<mpsc::Sender<TaskRun>>,
}

/// Marks a task as executing until dropped.
struct RunGuard {
    running: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .expect("running set mutex poisoned")
            .remove(&self.id);
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(store: TaskStore, executors: ExecutorRegistry, config: &SchedulerConfig) -> Self {
        Self {
            store,
            executors: Arc::new(executors),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
            running: Arc::new(Mutex::new(HashSet::new())),
            ticking: AtomicBool::new(false),
            runs_tx: None,
        }
    }

    /// Forward every completed run (manual or scheduled) to `tx`.
    pub fn with_run_channel(mut self, tx: mpsc::Sender<TaskRun>) -> Self {
        self.runs_tx = Some(tx);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Validate and persist a new active task with its first `next_run`.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn create_task(&self, input: NewTask) -> Result<ScheduledTask> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(SchedulerError::Validation("name is required".into()));
        }
        let kind: TaskKind = input.kind.trim().parse().map_err(SchedulerError::Validation)?;
        let schedule = CronSchedule::parse(&input.schedule)?;

        let created = now();
        let task = ScheduledTask {
            id: Uuid::new_v4().to_string(),
            name,
            description: input.description.trim().to_string(),
            schedule: schedule.expression().to_string(),
            kind,
            command: input.command,
            status: TaskStatus::Active,
            last_run: None,
            next_run: schedule.next_run(created),
            last_result: None,
            last_error: None,
            run_count: 0,
            created_at: created,
            updated_at: created,
        };
        self.store.insert(&task)?;
        info!(task_id = %task.id, kind = %task.kind, schedule = %task.schedule, next_run = ?task.next_run, "task created");
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Result<ScheduledTask> {
        self.store.get(id)
    }

    pub fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.store.list()
    }

    /// Stop automatic runs. `next_run` is kept as it was.
    pub fn pause(&self, id: &str) -> Result<ScheduledTask> {
        let task = self.store.get(id)?;
        if task.status == TaskStatus::Paused {
            return Ok(task);
        }
        let task = self.store.set_status(id, TaskStatus::Paused, task.next_run)?;
        info!(task_id = %id, "task paused");
        Ok(task)
    }

    /// Re-enable automatic runs from the next future slot, so slots missed
    /// while paused are not replayed. Resuming an active task changes nothing.
    pub fn resume(&self, id: &str) -> Result<ScheduledTask> {
        let task = self.store.get(id)?;
        if task.status == TaskStatus::Active {
            return Ok(task);
        }
        let next = CronSchedule::parse(&task.schedule)?.next_run(now());
        let task = self.store.set_status(id, TaskStatus::Active, next)?;
        info!(task_id = %id, next_run = ?task.next_run, "task resumed");
        Ok(task)
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running
            .lock()
            .expect("running set mutex poisoned")
            .contains(id)
    }

    /// Execute a task immediately, whatever its status.
    ///
    /// Records the outcome like an automatic run but leaves `next_run`
    /// alone. Execution failures are part of the returned outcome; only a
    /// missing task or a run already in progress are errors.
    pub async fn run_now(&self, id: &str) -> Result<TaskOutcome> {
        let task = self.store.get(id)?;
        let guard = self
            .try_acquire(id)
            .ok_or_else(|| SchedulerError::AlreadyRunning { id: id.to_string() })?;

        info!(task_id = %id, kind = %task.kind, "manual run");
        let started_at = now();
        let (outcome, _guard) = self.execute(&task, guard).await;
        self.finish(&task, started_at, RunTrigger::Manual, &outcome, NextRun::Unchanged)
            .await;
        Ok(outcome)
    }

    /// One scheduler pass at the current time.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(now()).await
    }

    /// Run every active task with `next_run <= now`. Due tasks execute
    /// concurrently and each is rescheduled from its completion time, so a
    /// backlog of missed slots collapses into a single run.
    ///
    /// Never fails: store errors are logged and the tick is abandoned. A
    /// tick that starts while another is still in progress does nothing.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        if self.ticking.swap(true, Ordering::AcqRel) {
            debug!("previous tick still running; skipping");
            return TickReport::default();
        }
        let _ticking = TickGuard(&self.ticking);
        self.tick_inner(now).await
    }

    async fn tick_inner(&self, tick_time: DateTime<Utc>) -> TickReport {
        let due = match self.store.due(tick_time) {
            Ok(d) => d,
            Err(e) => {
                error!("loading due tasks failed: {e}");
                return TickReport::default();
            }
        };
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return report;
        }

        let mut runs = Vec::with_capacity(due.len());
        for task in due {
            match self.try_acquire(&task.id) {
                Some(guard) => runs.push(self.run_scheduled(task, guard, tick_time)),
                None => {
                    debug!(task_id = %task.id, "task already running; left due");
                    report.skipped += 1;
                }
            }
        }

        for outcome in join_all(runs).await {
            match outcome.result {
                RunResult::Success => report.succeeded += 1,
                RunResult::Failure => report.failed += 1,
            }
        }
        info!(
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "scheduler tick complete"
        );
        report
    }

    async fn run_scheduled(
        &self,
        task: ScheduledTask,
        guard: RunGuard,
        tick_time: DateTime<Utc>,
    ) -> TaskOutcome {
        info!(task_id = %task.id, name = %task.name, kind = %task.kind, "executing task");
        let started_at = now();
        let (outcome, _guard) = self.execute(&task, guard).await;

        // Never earlier than the tick that fired the task, so a tick driven
        // ahead of the wall clock still moves the schedule forward.
        let reference = now().max(tick_time);
        let next = match CronSchedule::parse(&task.schedule) {
            Ok(s) => s.next_run(reference),
            Err(e) => {
                warn!(task_id = %task.id, "stored schedule no longer parses: {e}");
                None
            }
        };
        self.finish(&task, started_at, RunTrigger::Schedule, &outcome, NextRun::Advance(next))
            .await;
        outcome
    }

    /// Run the executor with panic containment and the configured timeout.
    ///
    /// The guard comes back to the caller, who holds it while the outcome is
    /// recorded. On timeout the run is reported failed but the worker keeps
    /// going (blocking sections cannot be cancelled), so the guard moves to a
    /// watcher instead and the task stays claimed until the worker ends.
    async fn execute(
        &self,
        task: &ScheduledTask,
        guard: RunGuard,
    ) -> (TaskOutcome, Option<RunGuard>) {
        let started = Instant::now();
        let executors = Arc::clone(&self.executors);
        let kind = task.kind;
        let command = task.command.clone();
        let mut handle = tokio::spawn(async move { executors.execute(kind, &command).await });

        let waited = tokio::time::timeout(self.task_timeout, &mut handle).await;
        let mut guard = Some(guard);
        let result = match waited {
            Ok(Ok(r)) => r,
            Ok(Err(join_err)) => Err(TaskError::Failed(format!("task panicked: {join_err}"))),
            Err(_) => {
                let id = task.id.clone();
                let held = guard.take();
                tokio::spawn(async move {
                    let late = handle.await;
                    debug!(
                        task_id = %id,
                        completed = matches!(late, Ok(Ok(_))),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "timed-out run ended; task released"
                    );
                    drop(held);
                });
                Err(TaskError::Timeout {
                    secs: self.task_timeout.as_secs(),
                })
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(output) => {
                info!(task_id = %task.id, duration_ms, output = %output, "task succeeded");
                TaskOutcome {
                    result: RunResult::Success,
                    output: Some(output),
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!(task_id = %task.id, duration_ms, "task failed: {e}");
                TaskOutcome {
                    result: RunResult::Failure,
                    output: None,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        };
        (outcome, guard)
    }

    /// Persist the outcome and notify the run channel.
    async fn finish(
        &self,
        task: &ScheduledTask,
        started_at: DateTime<Utc>,
        trigger: RunTrigger,
        outcome: &TaskOutcome,
        next_run: NextRun,
    ) {
        let updated = match self.store.record_run(&task.id, started_at, outcome, next_run) {
            Ok(t) => t,
            Err(SchedulerError::TaskNotFound { .. }) => {
                debug!(task_id = %task.id, "task deleted during run; outcome dropped");
                return;
            }
            Err(e) => {
                error!(task_id = %task.id, "failed to record run: {e}");
                return;
            }
        };

        if let Some(tx) = &self.runs_tx {
            let run = TaskRun {
                task: updated,
                trigger,
                outcome: outcome.clone(),
            };
            if tx.send(run).await.is_err() {
                warn!(task_id = %task.id, "run channel closed; notification dropped");
            }
        }
    }

    fn try_acquire(&self, id: &str) -> Option<RunGuard> {
        let mut running = self.running.lock().expect("running set mutex poisoned");
        if !running.insert(id.to_string()) {
            return None;
        }
        Some(RunGuard {
            running: Arc::clone(&self.running),
            id: id.to_string(),
        })
    }
}

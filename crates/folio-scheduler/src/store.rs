use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use folio_core::time::{format_ts, now, parse_ts};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    types::{RunResult, ScheduledTask, TaskOutcome, TaskStatus},
};

const TASK_COLUMNS: &str = "id, name, description, schedule, kind, command, status, last_run,
     next_run, last_result, last_error, run_count, created_at, updated_at";

/// How `record_run` treats `next_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// Manual runs leave the schedule alone.
    Unchanged,
    /// Automatic runs advance it, but only while the task is still active so
    /// a pause issued mid-run sticks.
    Advance(Option<DateTime<Utc>>),
}

/// Persistence for scheduled tasks. Pure storage: validation and schedule
/// maths live in [`crate::Scheduler`].
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("task store mutex poisoned")
    }

    pub fn insert(&self, task: &ScheduledTask) -> Result<()> {
        self.conn().execute(
            "INSERT INTO scheduled_tasks
             (id, name, description, schedule, kind, command, status, last_run, next_run,
              last_result, last_error, run_count, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                task.id,
                task.name,
                task.description,
                task.schedule,
                task.kind.as_str(),
                task.command,
                task.status.to_string(),
                task.last_run.map(format_ts),
                task.next_run.map(format_ts),
                task.last_result.map(|r| r.to_string()),
                task.last_error,
                task.run_count as i64,
                format_ts(task.created_at),
                format_ts(task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<ScheduledTask> {
        self.conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"),
                [id],
                row_to_task,
            )
            .optional()?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })
    }

    /// All tasks ordered by creation time.
    pub fn list(&self) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Active tasks whose `next_run` is at or before `now`, oldest slot first.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks
             WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= ?1
             ORDER BY next_run, id"
        ))?;
        let rows = stmt.query_map([format_ts(now)], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Set status and `next_run` together.
    pub fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<ScheduledTask> {
        let n = self.conn().execute(
            "UPDATE scheduled_tasks SET status = ?1, next_run = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                status.to_string(),
                next_run.map(format_ts),
                format_ts(now()),
                id
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        self.get(id)
    }

    /// Store the outcome of a run started at `started_at`.
    pub fn record_run(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
        outcome: &TaskOutcome,
        next_run: NextRun,
    ) -> Result<ScheduledTask> {
        let (advance, next) = match next_run {
            NextRun::Unchanged => (false, None),
            NextRun::Advance(t) => (true, t.map(format_ts)),
        };
        let n = self.conn().execute(
            "UPDATE scheduled_tasks SET
                last_run    = ?1,
                last_result = ?2,
                last_error  = ?3,
                run_count   = run_count + 1,
                next_run    = CASE WHEN ?4 AND status = 'active' THEN ?5 ELSE next_run END,
                updated_at  = ?6
             WHERE id = ?7",
            params![
                format_ts(started_at),
                outcome.result.to_string(),
                outcome.error,
                advance,
                next,
                format_ts(now()),
                id
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        debug!(task_id = %id, result = %outcome.result, "run recorded");
        self.get(id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let n = self
            .conn()
            .execute("DELETE FROM scheduled_tasks WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let kind: String = row.get(4)?;
    let status: String = row.get(6)?;
    let last_run: Option<String> = row.get(7)?;
    let next_run: Option<String> = row.get(8)?;
    let last_result: Option<String> = row.get(9)?;
    let run_count: i64 = row.get(11)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    Ok(ScheduledTask {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        schedule: row.get(3)?,
        kind: kind.parse().map_err(|e: String| text_error(4, e))?,
        command: row.get(5)?,
        status: status.parse().map_err(|e: String| text_error(6, e))?,
        last_run: last_run.as_deref().and_then(parse_ts),
        next_run: next_run.as_deref().and_then(parse_ts),
        last_result: last_result
            .as_deref()
            .map(str::parse::<RunResult>)
            .transpose()
            .map_err(|e| text_error(9, e))?,
        last_error: row.get(10)?,
        run_count: run_count.max(0) as u64,
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_ts(&updated_at).unwrap_or_else(Utc::now),
    })
}

fn text_error(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, msg.into())
}

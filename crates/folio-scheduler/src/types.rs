use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a task does when it fires. Selects the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Backup,
    Email,
    Maintenance,
    Custom,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Backup => "backup",
            TaskKind::Email => "email",
            TaskKind::Maintenance => "maintenance",
            TaskKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "backup" => Ok(TaskKind::Backup),
            "email" => Ok(TaskKind::Email),
            "maintenance" => Ok(TaskKind::Maintenance),
            "custom" => Ok(TaskKind::Custom),
            other => Err(format!(
                "unknown task type '{other}' (expected backup, email, maintenance or custom)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for automatic runs.
    Active,
    /// Skipped by ticks; still runnable by hand.
    Paused,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Success,
    Failure,
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunResult::Success => "success",
            RunResult::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunResult::Success),
            "failure" => Ok(RunResult::Failure),
            other => Err(format!("unknown run result: {other}")),
        }
    }
}

/// A persisted scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Five-field cron expression, evaluated in the server's local time zone.
    pub schedule: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// Kind-specific argument, e.g. the email JSON or `<handler> <arg>`.
    pub command: String,
    pub status: TaskStatus,
    /// Start time of the most recent run.
    pub last_run: Option<DateTime<Utc>>,
    /// Next automatic run; `None` only when the expression has no future slot.
    pub next_run: Option<DateTime<Utc>>,
    pub last_result: Option<RunResult>,
    /// Error message of the last run when it failed.
    pub last_error: Option<String>,
    pub run_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// Due for an automatic run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.next_run.is_some_and(|t| t <= now)
    }
}

/// Admin input for a new task. `type` stays a string so an unknown value
/// surfaces as a validation error rather than a body-parse rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schedule: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: String,
}

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Schedule,
    Manual,
}

/// Result of one execution, as returned from a manual run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub result: RunResult,
    /// Short summary from the executor (e.g. the backup file path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result == RunResult::Success
    }
}

/// A completed run, forwarded to whoever listens on the scheduler's run
/// channel (the gateway turns these into webhook events).
#[derive(Debug, Clone)]
pub struct TaskRun {
    /// Task state after the run was recorded.
    pub task: ScheduledTask,
    pub trigger: RunTrigger,
    pub outcome: TaskOutcome,
}

use thiserror::Error;

/// Errors returned by task management calls.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Malformed admin input (empty name, unknown task type, ...).
    #[error("{0}")]
    Validation(String),

    /// The cron expression could not be parsed.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No task with the given ID exists in the store.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// The task is executing right now; a second concurrent run is refused.
    #[error("Task is already running: {id}")]
    AlreadyRunning { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why a single task execution failed. Recorded on the task, never thrown
/// out of a tick.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("no custom handler named '{0}'")]
    UnknownHandler(String),

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

//! `folio-scheduler`: cron-driven task runner with SQLite persistence.
//!
//! # Overview
//!
//! Tasks are persisted to the `scheduled_tasks` table. The
//! [`engine::SchedulerEngine`] wakes on a fixed interval and asks the
//! [`Scheduler`] to run every active task whose `next_run` has arrived; each
//! run is dispatched by [`TaskKind`] through the [`ExecutorRegistry`], then
//! the task's stats are updated and its next slot computed from the cron
//! expression.
//!
//! # Task kinds
//!
//! | Kind          | Collaborator                 | `command`                         |
//! |---------------|------------------------------|-----------------------------------|
//! | `backup`      | [`BackupService`]            | ignored                           |
//! | `email`       | [`Mailer`]                   | JSON `{"to","subject","body"}`    |
//! | `maintenance` | [`MaintenanceService`]       | optional comma-separated steps    |
//! | `custom`      | [`CustomHandler`] by name    | `<handler> [argument]`            |
//!
//! Failures never escape a tick: they are stored as `last_result = failure`
//! with the error message, and the schedule still advances.

pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod runners;
pub mod scheduler;
pub mod store;
pub mod types;

pub use engine::{EngineHandle, SchedulerEngine};
pub use error::{Result, SchedulerError, TaskError};
pub use executor::{
    BackupService, CustomHandler, EmailCommand, ExecutorRegistry, Mailer, MaintenanceService,
};
pub use scheduler::{Scheduler, TickReport};
pub use store::TaskStore;
pub use types::{
    NewTask, RunResult, RunTrigger, ScheduledTask, TaskKind, TaskOutcome, TaskRun, TaskStatus,
};

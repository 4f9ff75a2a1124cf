use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::TaskError, types::TaskKind};

/// Outcome of one executor call: a short human-readable summary on success.
pub type ExecResult = std::result::Result<String, TaskError>;

/// Produces a database snapshot. Returns where it was written.
#[async_trait]
pub trait BackupService: Send + Sync {
    async fn create_backup(&self) -> ExecResult;
}

/// Sends the message described by an `email` task's command.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &EmailCommand) -> ExecResult;
}

/// Housekeeping for `maintenance` tasks. `command` may narrow the work to
/// specific steps; an empty command means all of them.
#[async_trait]
pub trait MaintenanceService: Send + Sync {
    async fn run_maintenance(&self, command: &str) -> ExecResult;
}

/// A named handler for `custom` tasks. Receives everything after the
/// handler name in the task command.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    async fn run(&self, args: &str) -> ExecResult;
}

/// The `command` of an `email` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailCommand {
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl EmailCommand {
    pub fn parse(command: &str) -> std::result::Result<Self, TaskError> {
        let email: EmailCommand = serde_json::from_str(command).map_err(|e| {
            TaskError::InvalidCommand(format!(
                "email tasks take JSON {{\"to\", \"subject\", \"body\"}}: {e}"
            ))
        })?;
        if email.to.trim().is_empty() {
            return Err(TaskError::InvalidCommand("email recipient is empty".into()));
        }
        Ok(email)
    }
}

/// Maps a task kind to the collaborator that performs it.
///
/// Collaborators are optional; a task whose collaborator is missing fails
/// with [`TaskError::NotConfigured`] instead of silently succeeding.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    backup: Option<Arc<dyn BackupService>>,
    mailer: Option<Arc<dyn Mailer>>,
    maintenance: Option<Arc<dyn MaintenanceService>>,
    custom: HashMap<String, Arc<dyn CustomHandler>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backup(mut self, service: Arc<dyn BackupService>) -> Self {
        self.backup = Some(service);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_maintenance(mut self, service: Arc<dyn MaintenanceService>) -> Self {
        self.maintenance = Some(service);
        self
    }

    /// Register `handler` under `name`; replaces any earlier registration.
    pub fn with_custom(mut self, name: impl Into<String>, handler: Arc<dyn CustomHandler>) -> Self {
        self.custom.insert(name.into(), handler);
        self
    }

    /// Names of registered custom handlers, sorted.
    pub fn custom_handlers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn execute(&self, kind: TaskKind, command: &str) -> ExecResult {
        match kind {
            TaskKind::Backup => {
                let service = self.backup.as_ref().ok_or(TaskError::NotConfigured("backup"))?;
                service.create_backup().await
            }
            TaskKind::Email => {
                let mailer = self.mailer.as_ref().ok_or(TaskError::NotConfigured("smtp"))?;
                let email = EmailCommand::parse(command)?;
                mailer.send(&email).await
            }
            TaskKind::Maintenance => {
                let service = self
                    .maintenance
                    .as_ref()
                    .ok_or(TaskError::NotConfigured("maintenance"))?;
                service.run_maintenance(command.trim()).await
            }
            TaskKind::Custom => {
                let (name, args) = split_command(command);
                if name.is_empty() {
                    return Err(TaskError::InvalidCommand(
                        "custom tasks need a handler name".into(),
                    ));
                }
                let handler = self
                    .custom
                    .get(name)
                    .ok_or_else(|| TaskError::UnknownHandler(name.to_string()))?;
                handler.run(args).await
            }
        }
    }
}

/// `"emit post.published {..}"` -> `("emit", "post.published {..}")`.
fn split_command(command: &str) -> (&str, &str) {
    let command = command.trim();
    match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim_start()),
        None => (command, ""),
    }
}

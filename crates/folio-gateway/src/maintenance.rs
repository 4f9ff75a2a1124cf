use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use folio_core::time::now;
use folio_scheduler::{error::TaskError, executor::ExecResult, MaintenanceService};
use folio_webhooks::WebhookStore;
use rusqlite::Connection;
use tracing::info;

use crate::auth::SessionStore;

const STEPS: [&str; 3] = ["logs", "sessions", "optimize"];

/// Housekeeping run by `maintenance` tasks.
///
/// Steps: `logs` purges webhook delivery logs past retention, `sessions`
/// drops expired admin sessions, `optimize` runs `PRAGMA optimize`. A task
/// command lists the steps to run (comma or space separated); an empty
/// command runs all of them.
pub struct StoreMaintenance {
    webhooks: Arc<WebhookStore>,
    sessions: Arc<SessionStore>,
    conn: Mutex<Connection>,
    log_retention: Duration,
}

impl StoreMaintenance {
    pub fn new(
        webhooks: Arc<WebhookStore>,
        sessions: Arc<SessionStore>,
        conn: Connection,
        log_retention_days: i64,
    ) -> Self {
        Self {
            webhooks,
            sessions,
            conn: Mutex::new(conn),
            log_retention: Duration::days(log_retention_days.max(0)),
        }
    }

    fn run_step(&self, step: &str) -> Result<String, TaskError> {
        match step {
            "logs" => {
                let cutoff = now() - self.log_retention;
                let n = self
                    .webhooks
                    .purge_logs_before(cutoff)
                    .map_err(|e| TaskError::Failed(format!("log purge failed: {e}")))?;
                Ok(format!("{n} webhook log(s) purged"))
            }
            "sessions" => {
                let n = self.sessions.purge_expired();
                Ok(format!("{n} expired session(s) dropped"))
            }
            "optimize" => {
                self.conn
                    .lock()
                    .expect("maintenance connection mutex poisoned")
                    .execute_batch("PRAGMA optimize;")
                    .map_err(|e| TaskError::Failed(format!("PRAGMA optimize failed: {e}")))?;
                Ok("database optimized".to_string())
            }
            other => Err(TaskError::InvalidCommand(format!(
                "unknown maintenance step '{other}' (expected {})",
                STEPS.join(", ")
            ))),
        }
    }
}

#[async_trait]
impl MaintenanceService for StoreMaintenance {
    async fn run_maintenance(&self, command: &str) -> ExecResult {
        let requested: Vec<&str> = command
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();
        let steps = if requested.is_empty() {
            STEPS.to_vec()
        } else {
            requested
        };

        let mut report = Vec::with_capacity(steps.len());
        for step in steps {
            report.push(self.run_step(step)?);
        }
        let summary = report.join("; ");
        info!(summary = %summary, "maintenance complete");
        Ok(summary)
    }
}

//! Built-in handlers for `custom` tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_scheduler::{error::TaskError, executor::ExecResult, CustomHandler};
use folio_webhooks::{WebhookDispatcher, WebhookEvent};
use serde_json::Value;

/// `emit <event> [json]`: dispatch a webhook event from a task.
pub struct EmitHandler {
    dispatcher: Arc<WebhookDispatcher>,
}

impl EmitHandler {
    pub fn new(dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl CustomHandler for EmitHandler {
    async fn run(&self, args: &str) -> ExecResult {
        let (name, rest) = match args.split_once(char::is_whitespace) {
            Some((n, r)) => (n, r.trim()),
            None => (args, ""),
        };
        let event: WebhookEvent = name.parse().map_err(TaskError::InvalidCommand)?;
        let payload = if rest.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(rest)
                .map_err(|e| TaskError::InvalidCommand(format!("payload is not JSON: {e}")))?
        };

        let summary = self.dispatcher.dispatch(event, payload).await;
        Ok(format!(
            "{event}: {} delivered, {} failed",
            summary.succeeded, summary.failed
        ))
    }
}

/// `ping <url>`: succeed when `url` answers a GET with 2xx.
pub struct PingHandler {
    client: reqwest::Client,
}

impl PingHandler {
    pub fn new(timeout: Duration) -> Result<Self, TaskError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskError::Failed(format!("HTTP client error: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CustomHandler for PingHandler {
    async fn run(&self, args: &str) -> ExecResult {
        let url = args.trim();
        if url.is_empty() {
            return Err(TaskError::InvalidCommand("usage: ping <url>".into()));
        }
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TaskError::Failed(format!("{url} unreachable: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            Ok(format!("{url} answered {}", status.as_u16()))
        } else {
            Err(TaskError::Failed(format!("{url} answered {}", status.as_u16())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_webhooks::{DispatcherConfig, WebhookStore};
    use rusqlite::Connection;

    fn dispatcher() -> Arc<WebhookDispatcher> {
        let store = Arc::new(WebhookStore::new(Connection::open_in_memory().unwrap()).unwrap());
        Arc::new(WebhookDispatcher::new(store, DispatcherConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn emit_validates_event_and_payload() {
        let h = EmitHandler::new(dispatcher());
        assert!(matches!(
            h.run("post.exploded").await,
            Err(TaskError::InvalidCommand(_))
        ));
        assert!(matches!(
            h.run("post.published {oops").await,
            Err(TaskError::InvalidCommand(_))
        ));
        let out = h.run(r#"post.published {"id": 1}"#).await.unwrap();
        assert_eq!(out, "post.published: 0 delivered, 0 failed");
    }

    #[tokio::test]
    async fn ping_requires_url() {
        let h = PingHandler::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(h.run("  ").await, Err(TaskError::InvalidCommand(_))));
        assert!(matches!(
            h.run("http://127.0.0.1:9/").await,
            Err(TaskError::Failed(_))
        ));
    }
}

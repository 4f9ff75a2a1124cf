use std::sync::Arc;
use std::time::{Duration, Instant};

use folio_core::config::WebhooksConfig;
use folio_core::time::{format_ts, now};
use futures_util::future::join_all;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, WebhookError},
    events::{WebhookEvent, PING_EVENT},
    signing::{sign, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER, WEBHOOK_ID_HEADER},
    store::WebhookStore,
    types::{DeliveryResult, Webhook, WebhookLog},
};

/// Tunables for outbound delivery.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Whole-request bound (connect + send + response body).
    pub timeout: Duration,
    /// Bytes of response body kept in the delivery log.
    pub response_body_limit: usize,
    pub user_agent: String,
}

impl From<&WebhooksConfig> for DispatcherConfig {
    fn from(cfg: &WebhooksConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.timeout_secs),
            response_body_limit: cfg.response_body_limit,
            user_agent: cfg.user_agent.clone(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&WebhooksConfig::default())
    }
}

/// Aggregate outcome of one `dispatch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Delivers domain events to subscribed webhooks.
///
/// Shared as `Arc<WebhookDispatcher>`; the inner `reqwest::Client` pools
/// connections across deliveries.
pub struct WebhookDispatcher {
    store: Arc<WebhookStore>,
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<WebhookStore>, config: DispatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            // A redirect would re-send the signed body to a URL the admin never registered.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Http(e.to_string()))?;
        Ok(Self {
            store,
            client,
            config,
        })
    }

    pub fn store(&self) -> &Arc<WebhookStore> {
        &self.store
    }

    /// Deliver `event` to every active subscriber, one attempt each.
    ///
    /// Deliveries run concurrently and independently; a slow or failing
    /// receiver only affects its own counters. Never returns an error: store
    /// failures while looking up subscribers are logged and yield an empty
    /// summary.
    pub async fn dispatch(&self, event: WebhookEvent, payload: Value) -> DispatchSummary {
        let hooks = match self.store.active_subscribers(event) {
            Ok(h) => h,
            Err(e) => {
                error!(event = %event, "webhook subscriber lookup failed: {e}");
                return DispatchSummary::default();
            }
        };
        if hooks.is_empty() {
            debug!(event = %event, "no active webhooks subscribed");
            return DispatchSummary::default();
        }

        let logs = join_all(
            hooks
                .iter()
                .map(|w| self.deliver(w, event.as_str(), &payload)),
        )
        .await;

        let succeeded = logs.iter().filter(|l| l.success).count();
        let summary = DispatchSummary {
            attempted: logs.len(),
            succeeded,
            failed: logs.len() - succeeded,
        };
        info!(
            event = %event,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "event dispatched"
        );
        summary
    }

    /// Fire-and-forget variant for domain code: the emitter never waits on
    /// receivers. The handle can be awaited when the caller does care.
    pub fn emit(self: &Arc<Self>, event: WebhookEvent, payload: Value) -> JoinHandle<DispatchSummary> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.dispatch(event, payload).await })
    }

    /// Send a sample delivery to one webhook, whatever its status.
    ///
    /// Uses the first subscribed event's sample payload, or a `ping` when the
    /// webhook has no subscriptions. Accounted exactly like a real delivery.
    pub async fn test(&self, id: &str) -> Result<DeliveryResult> {
        let webhook = self.store.get(id)?;
        let (event_name, payload) = match webhook.events.first() {
            Some(event) => (event.as_str(), event.sample_payload()),
            None => (
                PING_EVENT,
                json!({ "message": "Test delivery from Folio", "webhookId": webhook.id }),
            ),
        };
        info!(webhook_id = %id, event = %event_name, "test delivery requested");
        let log = self.deliver(&webhook, event_name, &payload).await;
        Ok(DeliveryResult::from(&log))
    }

    /// One signed POST. Always produces exactly one log row (unless the
    /// webhook disappeared mid-flight).
    async fn deliver(&self, webhook: &Webhook, event_name: &str, payload: &Value) -> WebhookLog {
        let started = Instant::now();
        let timestamp = now();
        let delivery_id = Uuid::new_v4().to_string();

        let body = json!({
            "event": event_name,
            "payload": payload,
            "timestamp": format_ts(timestamp),
        })
        .to_string()
        .into_bytes();
        let signature = sign(&webhook.secret, &body);

        let result = self
            .client
            .post(&webhook.url)
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event_name)
            .header(WEBHOOK_ID_HEADER, &webhook.id)
            .header(DELIVERY_HEADER, &delivery_id)
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        let (http_status, success, response_body, error) = match result {
            Ok(resp) => {
                let status = resp.status();
                // The status decides success; the body is only kept for the log.
                let text = read_body_prefix(resp, self.config.response_body_limit).await;
                (Some(status.as_u16()), status.is_success(), text, None)
            }
            Err(e) => (None, false, None, Some(describe_error(&e, self.config.timeout))),
        };

        let log = WebhookLog {
            id: delivery_id,
            webhook_id: webhook.id.clone(),
            timestamp,
            event_name: event_name.to_string(),
            http_status,
            success,
            response_body,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if success {
            info!(
                webhook_id = %webhook.id,
                event = %event_name,
                status = ?log.http_status,
                duration_ms = log.duration_ms,
                "webhook delivered"
            );
        } else {
            warn!(
                webhook_id = %webhook.id,
                event = %event_name,
                status = ?log.http_status,
                error = ?log.error,
                duration_ms = log.duration_ms,
                "webhook delivery failed"
            );
        }

        match self.store.record_delivery(&log) {
            Ok(()) => {}
            Err(WebhookError::NotFound { .. }) => {
                debug!(webhook_id = %webhook.id, "webhook deleted during delivery; outcome dropped");
            }
            Err(e) => error!(webhook_id = %webhook.id, "failed to record delivery: {e}"),
        }
        log
    }
}

fn describe_error(e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        format!("request timed out after {}ms", timeout.as_millis())
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

/// Read at most about `limit` bytes of the body, then drop the connection.
/// A body that fails to stream before any bytes arrive is not recorded.
async fn read_body_prefix(mut resp: reqwest::Response, limit: usize) -> Option<String> {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match resp.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) if buf.is_empty() => {
                debug!("response body unreadable: {e}");
                return None;
            }
            Err(_) => break,
        }
    }
    Some(truncate_body(&String::from_utf8_lossy(&buf), limit))
}

/// Cut `s` to at most `limit` bytes on a char boundary.
fn truncate_body(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

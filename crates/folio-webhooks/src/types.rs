use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::WebhookEvent;

/// Whether a webhook receives dispatched events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    #[default]
    Active,
    Inactive,
}

impl WebhookStatus {
    pub fn toggled(self) -> Self {
        match self {
            WebhookStatus::Active => WebhookStatus::Inactive,
            WebhookStatus::Inactive => WebhookStatus::Active,
        }
    }
}

impl std::fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WebhookStatus::Active => "active",
            WebhookStatus::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WebhookStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(WebhookStatus::Active),
            "inactive" => Ok(WebhookStatus::Inactive),
            other => Err(format!("unknown webhook status: {other}")),
        }
    }
}

/// A registered outbound endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// UUID v4 string: primary key.
    pub id: String,
    pub name: String,
    /// Absolute http(s) URL receiving the POST.
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub status: WebhookStatus,
    /// HMAC key for `X-Webhook-Signature`. Rotating it invalidates every
    /// signature a receiver could verify with the previous value.
    pub secret: String,
    pub success_count: u64,
    pub failure_count: u64,
    /// Time of the most recent successful delivery.
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn is_active(&self) -> bool {
        self.status == WebhookStatus::Active
    }

    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.events.contains(&event)
    }
}

/// Admin input for creating a webhook, as posted by the dashboard.
///
/// Events arrive as raw strings so unknown names can be reported back as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One delivery attempt. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLog {
    pub id: String,
    pub webhook_id: String,
    pub timestamp: DateTime<Utc>,
    /// Catalog name, or `ping` for test deliveries without subscriptions.
    pub event_name: String,
    /// `None` when the request failed before any response arrived.
    pub http_status: Option<u16>,
    pub success: bool,
    /// Receiver's response body, truncated to the configured limit.
    pub response_body: Option<String>,
    /// Transport error text (timeout, connection refused, ...).
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// What `test` returns to the admin: the attempt completed, whatever the
/// receiver answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,
    pub status: Option<u16>,
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&WebhookLog> for DeliveryResult {
    fn from(log: &WebhookLog) -> Self {
        Self {
            success: log.success,
            status: log.http_status,
            body: log.response_body.clone(),
            error: log.error.clone(),
        }
    }
}

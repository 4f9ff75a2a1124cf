//! `folio-webhooks`: outbound webhook subscriptions and signed delivery.
//!
//! # Overview
//!
//! Admins register endpoints ([`Webhook`]) subscribed to events from the
//! [`WebhookEvent`] catalog. When a domain action emits an event the
//! [`WebhookDispatcher`] POSTs a signed JSON body to every active subscriber,
//! updates the success/failure counters and appends one [`WebhookLog`] row
//! per attempt.
//!
//! Delivery is fire-and-forget: one attempt, bounded by a timeout, no retry.
//! A failing receiver never surfaces as an error to the code that emitted
//! the event.
//!
//! # Wire format
//!
//! ```text
//! POST <url>
//! Content-Type: application/json
//! X-Webhook-Event: post.published
//! X-Webhook-Id: <webhook id>
//! X-Webhook-Delivery: <uuid per attempt>
//! X-Webhook-Signature: sha256=<hex HMAC-SHA256(secret, body)>
//!
//! {"event":"post.published","payload":{...},"timestamp":"2026-10-16T02:00:00Z"}
//! ```

pub mod db;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod signing;
pub mod store;
pub mod types;

pub use dispatcher::{DispatchSummary, DispatcherConfig, WebhookDispatcher};
pub use error::{Result, WebhookError};
pub use events::{EventInfo, WebhookEvent};
pub use store::WebhookStore;
pub use types::{DeliveryResult, NewWebhook, Webhook, WebhookLog, WebhookStatus};

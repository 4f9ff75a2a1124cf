//! Outbound webhook management: /api/webhooks.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use folio_webhooks::{DeliveryResult, EventInfo, NewWebhook, Webhook, WebhookEvent, WebhookLog};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{app::AppState, error::ApiResult};

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

pub async fn list_webhooks(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Webhook>>> {
    Ok(Json(state.webhooks.store().list()?))
}

pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewWebhook>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Webhook>)> {
    let Json(input) = payload?;
    let webhook = state.webhooks.store().create(input)?;
    Ok((StatusCode::CREATED, Json(webhook)))
}

/// GET /api/webhooks/events: the subscribable catalog.
pub async fn list_events() -> Json<Vec<EventInfo>> {
    Json(WebhookEvent::catalog())
}

pub async fn get_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Webhook>> {
    Ok(Json(state.webhooks.store().get(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

/// GET /api/webhooks/{id}/logs?limit=N: newest first.
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<WebhookLog>>> {
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    Ok(Json(state.webhooks.store().logs(&id, limit)?))
}

pub async fn purge_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let deleted = state.webhooks.store().purge_logs(&id)?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// POST /api/webhooks/{id}/test
///
/// A receiver error is reported in the body (`success: false`), not as an
/// HTTP error.
pub async fn test_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryResult>> {
    Ok(Json(state.webhooks.test(&id).await?))
}

pub async fn toggle_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Webhook>> {
    Ok(Json(state.webhooks.store().toggle(&id)?))
}

pub async fn regenerate_secret(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Webhook>> {
    Ok(Json(state.webhooks.store().regenerate_secret(&id)?))
}

pub async fn delete_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.webhooks.store().delete(&id)?;
    Ok(Json(json!({ "success": true })))
}

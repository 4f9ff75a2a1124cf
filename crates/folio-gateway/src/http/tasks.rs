//! Scheduled task endpoints: /api/scheduled-tasks.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use folio_scheduler::{NewTask, ScheduledTask, TaskOutcome};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{app::AppState, error::ApiResult};

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ScheduledTask>>> {
    Ok(Json(state.scheduler.list_tasks()?))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ScheduledTask>)> {
    let Json(input) = payload?;
    let task = state.scheduler.create_task(input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduledTask>> {
    Ok(Json(state.scheduler.get_task(&id)?))
}

pub async fn pause_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduledTask>> {
    Ok(Json(state.scheduler.pause(&id)?))
}

pub async fn resume_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduledTask>> {
    Ok(Json(state.scheduler.resume(&id)?))
}

/// POST /api/scheduled-tasks/{id}/run
///
/// Waits for the run to finish. A failed run is still a 200 with
/// `result: "failure"`; 409 means the task was already executing.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskOutcome>> {
    Ok(Json(state.scheduler.run_now(&id).await?))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.scheduler.delete_task(&id)?;
    Ok(Json(json!({ "success": true })))
}

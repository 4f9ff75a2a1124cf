use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use folio_core::config::FolioConfig;
use folio_scheduler::Scheduler;
use folio_webhooks::WebhookDispatcher;

use crate::auth::{AdminCredentials, SessionStore};
use crate::http::{health, tasks, webhooks};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: FolioConfig,
    pub scheduler: Arc<Scheduler>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<AdminCredentials>,
}

impl AppState {
    pub fn new(
        config: FolioConfig,
        scheduler: Arc<Scheduler>,
        webhooks: Arc<WebhookDispatcher>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let credentials = Arc::new(AdminCredentials::from_config(&config.auth));
        Self {
            config,
            scheduler,
            webhooks,
            sessions,
            credentials,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/api/auth/me", get(crate::auth::me))
        .route(
            "/api/scheduled-tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/api/scheduled-tasks/{id}",
            get(tasks::get_task).delete(tasks::delete_task),
        )
        .route("/api/scheduled-tasks/{id}/pause", post(tasks::pause_task))
        .route("/api/scheduled-tasks/{id}/resume", post(tasks::resume_task))
        .route("/api/scheduled-tasks/{id}/run", post(tasks::run_task))
        .route(
            "/api/webhooks",
            get(webhooks::list_webhooks).post(webhooks::create_webhook),
        )
        .route("/api/webhooks/events", get(webhooks::list_events))
        .route(
            "/api/webhooks/{id}",
            get(webhooks::get_webhook).delete(webhooks::delete_webhook),
        )
        .route(
            "/api/webhooks/{id}/logs",
            get(webhooks::list_logs).delete(webhooks::purge_logs),
        )
        .route("/api/webhooks/{id}/test", post(webhooks::test_webhook))
        .route("/api/webhooks/{id}/toggle", post(webhooks::toggle_webhook))
        .route(
            "/api/webhooks/{id}/regenerate-secret",
            post(webhooks::regenerate_secret),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_admin,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/auth/login", post(crate::auth::login))
        .route("/api/auth/logout", post(crate::auth::logout))
        .merge(admin)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

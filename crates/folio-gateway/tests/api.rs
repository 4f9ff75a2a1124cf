// Router-level tests: every request goes through the real middleware stack
// via `oneshot`, backed by in-memory SQLite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use folio_core::config::FolioConfig;
use folio_gateway::{
    app::{build_router, AppState},
    auth::SessionStore,
};
use folio_scheduler::{
    error::TaskError, executor::ExecResult, CustomHandler, ExecutorRegistry, Scheduler, TaskStore,
};
use folio_webhooks::{DispatcherConfig, WebhookDispatcher, WebhookStore};
use rusqlite::Connection;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

struct Succeed;

#[async_trait]
impl CustomHandler for Succeed {
    async fn run(&self, _args: &str) -> ExecResult {
        Ok("fine".into())
    }
}

struct Fail;

#[async_trait]
impl CustomHandler for Fail {
    async fn run(&self, _args: &str) -> ExecResult {
        Err(TaskError::Failed("target refused".into()))
    }
}

struct Gate(Arc<Notify>);

#[async_trait]
impl CustomHandler for Gate {
    async fn run(&self, _args: &str) -> ExecResult {
        self.0.notified().await;
        Ok("released".into())
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    gate: Arc<Notify>,
}

fn harness() -> Harness {
    let mut config = FolioConfig::default();
    config.auth.password = Some("letmein".into());

    let gate = Arc::new(Notify::new());
    let registry = ExecutorRegistry::new()
        .with_custom("ok", Arc::new(Succeed))
        .with_custom("fail", Arc::new(Fail))
        .with_custom("gate", Arc::new(Gate(gate.clone())));
    let scheduler = Arc::new(Scheduler::new(
        TaskStore::new(Connection::open_in_memory().unwrap()).unwrap(),
        registry,
        &config.scheduler,
    ));
    let webhooks = Arc::new(
        WebhookDispatcher::new(
            Arc::new(WebhookStore::new(Connection::open_in_memory().unwrap()).unwrap()),
            DispatcherConfig {
                timeout: Duration::from_millis(500),
                ..DispatcherConfig::default()
            },
        )
        .unwrap(),
    );
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(3600)));
    let state = Arc::new(AppState::new(config, scheduler, webhooks, sessions));
    Harness {
        app: build_router(Arc::clone(&state)),
        state,
        gate,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Log in and return the `name=value` pair for the Cookie header.
async fn login(app: &Router) -> String {
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": "admin", "password": "letmein" }).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_requires_session() {
    let h = harness();
    for (method, uri) in [
        ("GET", "/api/scheduled-tasks"),
        ("POST", "/api/scheduled-tasks/x/run"),
        ("GET", "/api/webhooks"),
        ("GET", "/api/webhooks/events"),
        ("GET", "/api/auth/me"),
    ] {
        let (status, body) = send(&h.app, method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body["message"], "authentication required");
    }
    let (status, _) = send(
        &h.app,
        "GET",
        "/api/scheduled-tasks",
        Some("folio_session=forged"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_logout_cycle() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid username or password");

    let cookie = login(&h.app).await;
    let (status, body) = send(&h.app, "GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");

    let (status, _) = send(&h.app, "POST", "/api/auth/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.state.sessions.is_empty());
    let (status, _) = send(&h.app, "GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn task_lifecycle_over_http() {
    let h = harness();
    let cookie = login(&h.app).await;
    let c = Some(cookie.as_str());

    let (status, task) = send(
        &h.app,
        "POST",
        "/api/scheduled-tasks",
        c,
        Some(json!({
            "name": "Heartbeat",
            "description": "checks in",
            "schedule": "*/10 * * * *",
            "type": "custom",
            "command": "ok"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["type"], "custom");
    assert_eq!(task["status"], "active");
    assert_eq!(task["runCount"], 0);
    assert!(task["nextRun"].is_string());
    let id = task["id"].as_str().unwrap().to_string();

    let (status, paused) = send(&h.app, "POST", &format!("/api/scheduled-tasks/{id}/pause"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");

    let (status, outcome) = send(&h.app, "POST", &format!("/api/scheduled-tasks/{id}/run"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], "success");
    assert!(outcome["durationMs"].is_number());

    let (_, fetched) = send(&h.app, "GET", &format!("/api/scheduled-tasks/{id}"), c, None).await;
    assert_eq!(fetched["status"], "paused");
    assert_eq!(fetched["runCount"], 1);
    assert_eq!(fetched["lastResult"], "success");

    let (status, resumed) = send(&h.app, "POST", &format!("/api/scheduled-tasks/{id}/resume"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["status"], "active");
    assert_eq!(resumed["runCount"], 1);

    let (_, list) = send(&h.app, "GET", "/api/scheduled-tasks", c, None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(&h.app, "DELETE", &format!("/api/scheduled-tasks/{id}"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&h.app, "GET", &format!("/api/scheduled-tasks/{id}"), c, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn task_validation_errors_are_400() {
    let h = harness();
    let cookie = login(&h.app).await;
    let c = Some(cookie.as_str());

    for body in [
        json!({ "name": "x", "schedule": "every night", "type": "backup" }),
        json!({ "name": "x", "schedule": "0 2 * * *", "type": "reindex" }),
        json!({ "name": "", "schedule": "0 2 * * *", "type": "backup" }),
        json!({ "name": "x", "type": "backup" }),
    ] {
        let (status, resp) = send(&h.app, "POST", "/api/scheduled-tasks", c, Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(resp["message"].is_string(), "{body}");
    }
}

#[tokio::test]
async fn failed_run_is_200_with_failure() {
    let h = harness();
    let cookie = login(&h.app).await;
    let c = Some(cookie.as_str());
    let (_, task) = send(
        &h.app,
        "POST",
        "/api/scheduled-tasks",
        c,
        Some(json!({ "name": "Flaky", "schedule": "0 3 * * *", "type": "custom", "command": "fail" })),
    )
    .await;
    let id = task["id"].as_str().unwrap();

    let (status, outcome) = send(&h.app, "POST", &format!("/api/scheduled-tasks/{id}/run"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], "failure");
    assert_eq!(outcome["error"], "target refused");

    let (status, _) = send(&h.app, "POST", "/api/scheduled-tasks/missing/run", c, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_run_is_409() {
    let h = harness();
    let cookie = login(&h.app).await;
    let (_, task) = send(
        &h.app,
        "POST",
        "/api/scheduled-tasks",
        Some(&cookie),
        Some(json!({ "name": "Gated", "schedule": "0 3 * * *", "type": "custom", "command": "gate" })),
    )
    .await;
    let id = task["id"].as_str().unwrap().to_string();

    let app = h.app.clone();
    let first_cookie = cookie.clone();
    let first_uri = format!("/api/scheduled-tasks/{id}/run");
    let first = tokio::spawn(async move {
        send(&app, "POST", &first_uri, Some(&first_cookie), None).await
    });
    while !h.state.scheduler.is_running(&id) {
        tokio::task::yield_now().await;
    }

    let (status, body) = send(&h.app, "POST", &format!("/api/scheduled-tasks/{id}/run"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("already running"));

    h.gate.notify_one();
    let (status, outcome) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], "success");
}

#[tokio::test]
async fn webhook_management_over_http() {
    let h = harness();
    let cookie = login(&h.app).await;
    let c = Some(cookie.as_str());

    let (status, events) = send(&h.app, "GET", "/api/webhooks/events", c, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 14);

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/webhooks",
        c,
        Some(json!({ "name": "bad", "url": "ftp://example.com", "events": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/webhooks",
        c,
        Some(json!({ "name": "bad", "url": "https://example.com", "events": ["post.exploded"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("post.exploded"));

    // Port 9 is closed: the test delivery fails but the call succeeds.
    let (status, hook) = send(
        &h.app,
        "POST",
        "/api/webhooks",
        c,
        Some(json!({ "name": "CI", "url": "http://127.0.0.1:9/hook", "events": ["post.published"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hook["status"], "active");
    assert_eq!(hook["successCount"], 0);
    let id = hook["id"].as_str().unwrap().to_string();
    let secret = hook["secret"].as_str().unwrap().to_string();
    assert!(secret.starts_with("whsec_"));

    let (status, result) = send(&h.app, "POST", &format!("/api/webhooks/{id}/test"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], false);
    assert!(result["status"].is_null());

    let (_, logs) = send(&h.app, "GET", &format!("/api/webhooks/{id}/logs?limit=5"), c, None).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
    assert_eq!(logs[0]["eventName"], "post.published");

    for bad in ["abc", "-1"] {
        let (status, body) =
            send(&h.app, "GET", &format!("/api/webhooks/{id}/logs?limit={bad}"), c, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "limit={bad}");
        assert!(body["message"].is_string(), "limit={bad}");
    }

    let (_, fetched) = send(&h.app, "GET", &format!("/api/webhooks/{id}"), c, None).await;
    assert_eq!(fetched["failureCount"], 1);

    let (_, toggled) = send(&h.app, "POST", &format!("/api/webhooks/{id}/toggle"), c, None).await;
    assert_eq!(toggled["status"], "inactive");

    let (_, rotated) = send(&h.app, "POST", &format!("/api/webhooks/{id}/regenerate-secret"), c, None).await;
    assert_ne!(rotated["secret"], secret.as_str());

    let (_, purged) = send(&h.app, "DELETE", &format!("/api/webhooks/{id}/logs"), c, None).await;
    assert_eq!(purged["deleted"], 1);

    let (status, _) = send(&h.app, "DELETE", &format!("/api/webhooks/{id}"), c, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.app, "GET", &format!("/api/webhooks/{id}"), c, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.app, "POST", &format!("/api/webhooks/{id}/test"), c, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

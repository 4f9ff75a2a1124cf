//! Admin authentication: one configured account, server-side sessions keyed
//! by an opaque token in the `folio_session` cookie.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use folio_core::config::{AuthConfig, SESSION_COOKIE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

struct Session {
    username: String,
    expires_at: DateTime<Utc>,
}

/// In-memory admin sessions. Lost on restart, which simply logs everyone out.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(12)),
        }
    }

    /// Start a session for `username` and return its token.
    pub fn create(&self, username: &str) -> String {
        let token = hex::encode(rand::random::<[u8; 32]>());
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        token
    }

    /// Username behind `token`, if the session exists and has not expired.
    pub fn validate(&self, token: &str) -> Option<String> {
        let (username, expired) = {
            let session = self.sessions.get(token)?;
            (session.username.clone(), session.expires_at <= Utc::now())
        };
        if expired {
            self.sessions.remove(token);
            return None;
        }
        Some(username)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

enum PasswordCheck {
    Hash(String),
    Plain(String),
    Disabled,
}

/// The configured admin account.
pub struct AdminCredentials {
    username: String,
    check: PasswordCheck,
}

impl AdminCredentials {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let check = match (&cfg.password_hash, &cfg.password) {
            (Some(hash), _) => PasswordCheck::Hash(hash.clone()),
            (None, Some(pw)) => PasswordCheck::Plain(pw.clone()),
            (None, None) => PasswordCheck::Disabled,
        };
        Self {
            username: cfg.username.clone(),
            check,
        }
    }

    /// Whether any login can succeed.
    pub fn is_enabled(&self) -> bool {
        !matches!(self.check, PasswordCheck::Disabled)
    }

    pub fn uses_plaintext(&self) -> bool {
        matches!(self.check, PasswordCheck::Plain(_))
    }

    /// CPU-heavy for hashed passwords; call from a blocking context.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username != self.username {
            return false;
        }
        match &self.check {
            PasswordCheck::Hash(phc) => match PasswordHash::new(phc) {
                Ok(parsed) => Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
                Err(e) => {
                    warn!("auth.password_hash is not a valid PHC string: {e}");
                    false
                }
            },
            PasswordCheck::Plain(expected) => constant_time_eq(expected.as_bytes(), password.as_bytes()),
            PasswordCheck::Disabled => false,
        }
    }
}

/// Argon2id PHC string for `auth.password_hash`.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>()).map_err(|e| e.to_string())?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| e.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Inserted into request extensions by [`require_admin`].
#[derive(Debug, Clone, Serialize)]
pub struct AdminSession {
    pub username: String,
}

/// Middleware for every `/api/*` route except login/logout.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Unauthorized)?;
    let username = state
        .sessions
        .validate(&token)
        .ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(AdminSession { username });
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<Value>)> {
    let Json(body) = payload?;

    let credentials = Arc::clone(&state.credentials);
    let username = body.username.clone();
    let ok = tokio::task::spawn_blocking(move || credentials.verify(&username, &body.password))
        .await
        .map_err(|e| ApiError::Internal(format!("password check failed: {e}")))?;
    if !ok {
        warn!(username = %body.username, "admin login rejected");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions.create(&body.username);
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.secure_cookie);
    info!(username = %body.username, "admin logged in");
    Ok((jar.add(cookie), Json(json!({ "username": body.username }))))
}

/// POST /api/auth/logout: always succeeds and clears the cookie.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(c) = jar.get(SESSION_COOKIE) {
        if state.sessions.revoke(c.value()) {
            info!("admin logged out");
        }
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(json!({ "success": true })))
}

/// GET /api/auth/me
pub async fn me(Extension(session): Extension<AdminSession>) -> Json<AdminSession> {
    Json(session)
}

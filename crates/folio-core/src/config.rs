use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 1024; // bytes kept per WebhookLog
pub const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 60 * 60;
pub const SESSION_COOKIE: &str = "folio_session";

/// Top-level config (folio.toml + FOLIO_* env overrides).
///
/// Every section has defaults so a missing file still yields a runnable
/// (if locked-down) instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolioConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Outbound mail for `email` tasks. `None` makes those tasks fail with a
    /// clear message instead of silently succeeding.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Admin login for the dashboard API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Argon2 PHC string (`folio-gateway hash-password <pw>` prints one).
    pub password_hash: Option<String>,
    /// Plaintext fallback for local development. Ignored when
    /// `password_hash` is set.
    pub password: Option<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Adds the `Secure` attribute to the session cookie (enable behind TLS).
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password_hash: None,
            password: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false the background engine is not started; manual runs still work.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Upper bound for a single task execution before it counts as failed.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    /// Per-delivery HTTP timeout; an attempt past this counts as failed.
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    /// How much of a receiver's response body is kept in the delivery log.
    #[serde(default = "default_response_body_limit")]
    pub response_body_limit: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
            response_body_limit: DEFAULT_RESPONSE_BODY_LIMIT,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: String,
    /// Number of snapshots kept; older ones are deleted after each backup.
    #[serde(default = "default_backup_retain")]
    pub retain: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            retain: default_backup_retain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Webhook delivery logs older than this are purged by `maintenance` tasks.
    #[serde(default = "default_log_retention_days")]
    pub webhook_log_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            webhook_log_retention_days: default_log_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// RFC 5322 mailbox, e.g. `"Folio <noreply@example.com>"`.
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_admin_username() -> String {
    "admin".to_string()
}
fn default_session_ttl() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}
fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
fn default_task_timeout() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}
fn default_webhook_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}
fn default_response_body_limit() -> usize {
    DEFAULT_RESPONSE_BODY_LIMIT
}
fn default_user_agent() -> String {
    format!("folio-webhooks/{}", env!("CARGO_PKG_VERSION"))
}
fn default_backup_retain() -> usize {
    7
}
fn default_log_retention_days() -> i64 {
    30
}
fn default_smtp_port() -> u16 {
    587
}
fn default_log_filter() -> String {
    "folio_gateway=info,folio_scheduler=info,folio_webhooks=info,tower_http=info".to_string()
}
fn folio_home() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.folio", home)
}
fn default_db_path() -> String {
    format!("{}/folio.db", folio_home())
}
fn default_backup_dir() -> String {
    format!("{}/backups", folio_home())
}

impl FolioConfig {
    /// Load config from a TOML file with FOLIO_* env var overrides.
    ///
    /// Path resolution: explicit argument, then `~/.folio/folio.toml`.
    /// Nested keys use a double underscore in env vars, e.g.
    /// `FOLIO_SCHEDULER__TICK_INTERVAL_SECS=30`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: FolioConfig = Figment::from(Serialized::defaults(FolioConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FOLIO_").split("__"))
            .extract()
            .map_err(|e| crate::error::FolioError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the scheduler or dispatcher misbehave.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::FolioError;

        if self.scheduler.tick_interval_secs == 0 {
            return Err(FolioError::Config(
                "scheduler.tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.task_timeout_secs == 0 {
            return Err(FolioError::Config(
                "scheduler.task_timeout_secs must be at least 1".into(),
            ));
        }
        if self.webhooks.timeout_secs == 0 {
            return Err(FolioError::Config(
                "webhooks.timeout_secs must be at least 1".into(),
            ));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(FolioError::Config(
                "auth.session_ttl_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    format!("{}/folio.toml", folio_home())
}

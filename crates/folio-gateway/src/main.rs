use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use folio_core::config::FolioConfig;
use folio_gateway::{
    app::{self, AppState},
    auth::{self, SessionStore},
    custom::{EmitHandler, PingHandler},
    maintenance::StoreMaintenance,
    task_events,
};
use folio_scheduler::{
    runners::{SmtpMailer, SqliteBackup},
    ExecutorRegistry, Scheduler, SchedulerEngine, TaskRun, TaskStore,
};
use folio_webhooks::{DispatcherConfig, WebhookDispatcher, WebhookStore};
use rusqlite::Connection;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "folio-gateway", version, about = "Folio admin API, task scheduler and webhook dispatcher")]
struct Cli {
    /// Config file (defaults to $FOLIO_CONFIG, then ~/.folio/folio.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the scheduler (default).
    Serve,
    /// Print an argon2 hash for `auth.password_hash`.
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::HashPassword { password }) = &cli.command {
        let phc = auth::hash_password(password).map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?;
        println!("{phc}");
        return Ok(());
    }

    // explicit flag > FOLIO_CONFIG env > ~/.folio/folio.toml
    let config_path = cli.config.or_else(|| std::env::var("FOLIO_CONFIG").ok());
    let config = FolioConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .init();

    serve(config).await
}

async fn serve(config: FolioConfig) -> anyhow::Result<()> {
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path)?;
    info!(path = %db_path, "opening SQLite database");

    // each subsystem gets its own connection on the same file
    let open = || -> anyhow::Result<Connection> {
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        Ok(conn)
    };

    let webhook_store = Arc::new(WebhookStore::new(open()?)?);
    let dispatcher = Arc::new(WebhookDispatcher::new(
        Arc::clone(&webhook_store),
        DispatcherConfig::from(&config.webhooks),
    )?);
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(
        config.auth.session_ttl_secs,
    )));

    let mut executors = ExecutorRegistry::new()
        .with_backup(Arc::new(SqliteBackup::from_config(&db_path, &config.backup)))
        .with_maintenance(Arc::new(StoreMaintenance::new(
            Arc::clone(&webhook_store),
            Arc::clone(&sessions),
            open()?,
            config.maintenance.webhook_log_retention_days,
        )))
        .with_custom("emit", Arc::new(EmitHandler::new(Arc::clone(&dispatcher))))
        .with_custom(
            "ping",
            Arc::new(PingHandler::new(Duration::from_secs(config.webhooks.timeout_secs))?),
        );
    match &config.smtp {
        Some(smtp) => executors = executors.with_mailer(Arc::new(SmtpMailer::new(smtp)?)),
        None => info!("smtp not configured; email tasks will fail"),
    }
    info!(handlers = ?executors.custom_handlers(), "task executors ready");

    // completed runs: Scheduler → task_events router → webhooks
    let (runs_tx, runs_rx) = tokio::sync::mpsc::channel::<TaskRun>(256);
    let scheduler = Arc::new(
        Scheduler::new(TaskStore::new(open()?)?, executors, &config.scheduler)
            .with_run_channel(runs_tx),
    );
    task_events::spawn_router(runs_rx, Arc::clone(&dispatcher));

    let engine = if config.scheduler.enabled {
        let interval = Duration::from_secs(config.scheduler.tick_interval_secs);
        Some(SchedulerEngine::new(Arc::clone(&scheduler), interval).spawn())
    } else {
        warn!("scheduler disabled; tasks only run on demand");
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(AppState::new(config, scheduler, dispatcher, sessions));
    if !state.credentials.is_enabled() {
        warn!("no admin password configured; set auth.password_hash to enable login");
    } else if state.credentials.uses_plaintext() {
        warn!("auth.password is plaintext; prefer auth.password_hash");
    }
    let router = app::build_router(state);

    info!("Folio gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(engine) = engine {
        engine.stop().await;
    }
    info!("Folio gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use folio_core::config::BackupConfig;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::{
    error::TaskError,
    executor::{BackupService, ExecResult},
};

const FILE_PREFIX: &str = "folio-";
const FILE_SUFFIX: &str = ".db";

/// Snapshots the live SQLite database with `VACUUM INTO`.
///
/// Safe against a database in WAL mode with other open connections: the
/// snapshot is taken inside a read transaction on a dedicated connection.
/// Files are named by UTC timestamp so lexical order is age order, and only
/// the newest `retain` are kept.
#[derive(Debug, Clone)]
pub struct SqliteBackup {
    db_path: PathBuf,
    dir: PathBuf,
    retain: usize,
}

impl SqliteBackup {
    pub fn new(db_path: impl Into<PathBuf>, dir: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            db_path: db_path.into(),
            dir: dir.into(),
            retain: retain.max(1),
        }
    }

    pub fn from_config(db_path: impl Into<PathBuf>, cfg: &BackupConfig) -> Self {
        Self::new(db_path, &cfg.dir, cfg.retain)
    }

    /// Blocking body of [`BackupService::create_backup`].
    fn snapshot(&self) -> Result<(PathBuf, u64, usize), TaskError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            TaskError::Failed(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let target = next_free_path(&self.dir, Utc::now());
        let conn = Connection::open(&self.db_path).map_err(|e| {
            TaskError::Failed(format!("cannot open {}: {e}", self.db_path.display()))
        })?;
        let target_str = target.to_string_lossy().into_owned();
        conn.execute("VACUUM INTO ?1", [&target_str])
            .map_err(|e| TaskError::Failed(format!("VACUUM INTO failed: {e}")))?;
        drop(conn);

        let size = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        let pruned = prune(&self.dir, self.retain);
        Ok((target, size, pruned))
    }
}

#[async_trait]
impl BackupService for SqliteBackup {
    async fn create_backup(&self) -> ExecResult {
        let this = self.clone();
        let (path, size, pruned) = tokio::task::spawn_blocking(move || this.snapshot())
            .await
            .map_err(|e| TaskError::Failed(format!("backup worker failed: {e}")))??;
        info!(path = %path.display(), bytes = size, pruned, "backup written");
        Ok(path.display().to_string())
    }
}

fn file_name(at: DateTime<Utc>) -> String {
    format!("{FILE_PREFIX}{}{FILE_SUFFIX}", at.format("%Y%m%d-%H%M%S%3f"))
}

/// Timestamped path in `dir` that does not exist yet. Two backups in the
/// same millisecond get consecutive names.
fn next_free_path(dir: &Path, mut at: DateTime<Utc>) -> PathBuf {
    loop {
        let path = dir.join(file_name(at));
        if !path.exists() {
            return path;
        }
        at += Duration::milliseconds(1);
    }
}

/// Backup files in `dir`, oldest first.
fn backups_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
        })
        .collect();
    files.sort();
    files
}

/// Delete all but the newest `retain` backups. Returns how many went.
fn prune(dir: &Path, retain: usize) -> usize {
    let files = backups_in(dir);
    let excess = files.len().saturating_sub(retain);
    let mut removed = 0;
    for old in &files[..excess] {
        match fs::remove_file(old) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %old.display(), "failed to prune backup: {e}"),
        }
    }
    removed
}

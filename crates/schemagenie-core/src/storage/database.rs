//! SQLite connection pool for the embedded graph backend

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::storage::migrations;

/// Pool size for file-backed graphs
const MAX_CONNECTIONS: u32 = 5;

/// How long a writer waits for a locked database
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `<data dir>/schemagenie/graph.db`, or `./schemagenie.db` without a data dir
pub fn default_database_path() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("schemagenie").join("graph.db"),
        None => PathBuf::from("schemagenie.db"),
    }
}

/// A migrated SQLite pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    /// `None` for in-memory graphs
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the graph file at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open graph database: {}", path.display()))?;

        Self::migrated(pool, Some(path)).await
    }

    /// Private in-memory graph, used by tests
    pub async fn in_memory() -> Result<Self> {
        // Each connection to :memory: is its own database, so the pool keeps exactly one
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to create in-memory graph database")?;

        Self::migrated(pool, None).await
    }

    async fn migrated(pool: SqlitePool, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&pool)
            .await
            .context("Failed to run graph database migrations")?;
        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.path().is_none());

        let status = migrations::migration_status(db.pool()).await.unwrap();
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.db");

        let db = Database::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));

        // Reopening an existing file keeps its data and skips migrations
        sqlx::query("INSERT INTO import_runs (id, folder, started_at, finished_at) VALUES ('r1', 'x', 'a', 'b')")
            .execute(db.pool())
            .await
            .unwrap();
        db.pool().close().await;

        let reopened = Database::open(&path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM import_runs")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::in_memory().await.unwrap();

        let (enabled,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}

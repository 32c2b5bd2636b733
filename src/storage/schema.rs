use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_error, StoreError};

// ============================================================================
// Connection
// ============================================================================

/// Open a SQLite pool at `path` (or `:memory:`).
///
/// Shared by the item store and the local search index.
pub(crate) async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let url = format!("sqlite:{}?mode=rwc", path);

    // SEC-010: Create the file owner-only before the pool opens it
    #[cfg(unix)]
    if path != ":memory:" {
        use std::os::unix::fs::OpenOptionsExt;
        let db_path = std::path::Path::new(path);
        if !db_path.exists() {
            if let Some(parent) = db_path.parent().filter(|p| p.exists()) {
                tracing::debug!(path = %path, parent = %parent.display(), "Pre-creating database file");
                // If creation fails, SQLite will report the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }
    }

    // busy_timeout=5000: writers from other processes wait up to 5 seconds
    // for the lock instead of failing with SQLITE_BUSY.
    let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed item store.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open the item store and run migrations
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InstanceLocked` if another process has the
    /// database locked, `StoreError::Migration` if the schema cannot be
    /// created, and `StoreError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = connect(path).await.map_err(StoreError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_error(&e.to_string()) {
                StoreError::InstanceLocked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Opened item store");
        Ok(db)
    }

    /// Run migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Set-valued columns hold JSON arrays; `id` preserves insertion order
        // across upserts so listings are stable.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                uid TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                portal_type TEXT NOT NULL DEFAULT '',
                creator TEXT NOT NULL DEFAULT '',
                modified TEXT NOT NULL,
                url TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '[]',
                category TEXT,
                feed_type TEXT NOT NULL DEFAULT '[]',
                deletion_reason TEXT,
                tile_urls TEXT NOT NULL DEFAULT '[]',
                deleted_tile_urls TEXT NOT NULL DEFAULT '[]',
                content TEXT NOT NULL DEFAULT '[]'
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

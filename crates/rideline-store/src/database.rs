// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All reads and writes are serialized through tokio-rusqlite's single
//! background thread. Do NOT create additional Connection instances for
//! writes; change feeds share this handle.

use std::sync::Arc;

use rideline_core::RidelineError;
use tokio::sync::Notify;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into `RidelineError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RidelineError {
    RidelineError::Storage {
        source: Box::new(e),
    }
}

/// Convert a tokio-rusqlite error into a transport failure for change feeds.
pub(crate) fn map_feed_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RidelineError {
    RidelineError::Transport {
        message: "change feed read failed".to_string(),
        source: Some(Box::new(e)),
    }
}

/// Wrap a JSON encoding failure so it can leave a `conn.call` closure.
pub(crate) fn encode_err(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

/// Wrap a JSON or timestamp decoding failure for column `idx`.
pub(crate) fn decode_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn pragmas(wal_mode: bool) -> String {
    let journal = if wal_mode { "WAL" } else { "DELETE" };
    format!(
        "PRAGMA journal_mode = {journal};
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;"
    )
}

/// Handle to the Rideline SQLite database.
///
/// Cloning is cheap: clones share the background connection thread and the
/// in-process change notifier.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    changes: Arc<Notify>,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and
    /// apply pending migrations.
    pub async fn open(path: &str) -> Result<Self, RidelineError> {
        Self::open_with(path, true).await
    }

    /// Open the database with an explicit journal mode.
    ///
    /// Migrations run on a short-lived synchronous connection before the
    /// async connection is opened.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, RidelineError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| RidelineError::Storage {
                source: Box::new(e),
            })?;
        }

        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), RidelineError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(|e| RidelineError::Storage {
                    source: Box::new(e),
                })?;
            conn.execute_batch(&pragmas(wal_mode))
                .map_err(|e| RidelineError::Storage {
                    source: Box::new(e),
                })?;
            migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| RidelineError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| RidelineError::Storage {
                source: Box::new(e),
            })?;
        let batch = pragmas(wal_mode);
        conn.call(move |conn| conn.execute_batch(&batch))
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self {
            conn,
            changes: Arc::new(Notify::new()),
        })
    }

    /// The shared async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Notifier signalled after every committed job write in this process.
    pub(crate) fn changes(&self) -> &Arc<Notify> {
        &self.changes
    }

    /// Wake every change feed of this process.
    pub(crate) fn notify_changed(&self) {
        self.changes.notify_waiters();
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), RidelineError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), RidelineError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| RidelineError::Storage {
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_parent_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("rideline.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());

        let mode: String = db
            .connection()
            .call(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_skips_applied_migrations() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        let path = db_path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

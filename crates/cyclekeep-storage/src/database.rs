// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use cyclekeep_config::model::StorageConfig;
use cyclekeep_core::CyclekeepError;
use tracing::{debug, info};

use crate::migrations;

/// Convert a tokio-rusqlite error into CyclekeepError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CyclekeepError {
    CyclekeepError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single SQLite connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open with default storage settings at `path`.
    pub async fn open(path: &str) -> Result<Self, CyclekeepError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open the configured database, apply PRAGMAs, and run migrations.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, CyclekeepError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CyclekeepError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| CyclekeepError::Storage {
                source: Box::new(e),
            })?;

        let wal_mode = config.wal_mode;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        let applied = conn
            .call(|conn| -> Result<usize, refinery::Error> { migrations::run_migrations(conn) })
            .await
            .map_err(|e| CyclekeepError::storage(format!("migration failed: {e}")))?;

        if applied > 0 {
            info!(path = %path, applied, "session schema migrated");
        }
        debug!(path = %path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), CyclekeepError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), CyclekeepError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| CyclekeepError::Storage {
            source: Box::new(e),
        })
    }
}

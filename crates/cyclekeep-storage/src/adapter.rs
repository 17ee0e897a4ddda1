// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the SessionBackend trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use cyclekeep_config::model::StorageConfig;
use cyclekeep_config::validation::is_plain_identifier;
use cyclekeep_core::{
    CyclekeepError, HealthStatus, IndexKey, PersistedSessionState, PluginAdapter,
    SessionBackend, SessionStatus,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed session backend.
///
/// Wraps a [`Database`] handle and delegates to the typed query module. The
/// database is opened on the first call to [`SessionBackend::initialize`].
pub struct SqliteBackend {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteBackend {
    /// Create a backend for the given configuration without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, CyclekeepError> {
        self.db.get().ok_or_else(|| CyclekeepError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    fn table(&self) -> &str {
        &self.config.table_name
    }
}

#[async_trait]
impl PluginAdapter for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, CyclekeepError> {
        let Some(db) = self.db.get() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        if queries::sessions::table_exists(db, self.table()).await? {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy(format!(
                "table `{}` is missing",
                self.table()
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), CyclekeepError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for SqliteBackend {
    async fn initialize(&self) -> Result<(), CyclekeepError> {
        if !is_plain_identifier(self.table()) {
            return Err(CyclekeepError::Config(format!(
                "storage.table_name `{}` is not a plain identifier",
                self.table()
            )));
        }

        let db = Database::open_with(&self.config).await?;
        if !queries::sessions::table_exists(&db, self.table()).await? {
            return Err(CyclekeepError::Config(format!(
                "session table `{}` is not provisioned in {}",
                self.table(),
                self.config.database_path
            )));
        }

        self.db.set(db).map_err(|_| CyclekeepError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(
            path = %self.config.database_path,
            table = %self.table(),
            "SQLite session backend initialized"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), CyclekeepError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn get_item(
        &self,
        session_id: &str,
    ) -> Result<Option<PersistedSessionState>, CyclekeepError> {
        queries::sessions::get_session(self.db()?, self.table(), session_id).await
    }

    async fn put_item(&self, state: &PersistedSessionState) -> Result<(), CyclekeepError> {
        queries::sessions::upsert_session(self.db()?, self.table(), state).await
    }

    async fn delete_item(&self, session_id: &str) -> Result<(), CyclekeepError> {
        let removed =
            queries::sessions::delete_session(self.db()?, self.table(), session_id).await?;
        debug!(session_id, removed, "session item deleted");
        Ok(())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
        expected: Option<SessionStatus>,
    ) -> Result<(), CyclekeepError> {
        let changed = queries::sessions::update_status(
            self.db()?,
            self.table(),
            session_id,
            status,
            updated_at,
            expected,
        )
        .await?;

        match expected {
            Some(expected) if changed == 0 => Err(CyclekeepError::PreconditionFailed {
                session_id: session_id.to_string(),
                expected,
            }),
            _ => Ok(()),
        }
    }

    async fn delete_if_expired(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        status: Option<SessionStatus>,
    ) -> Result<bool, CyclekeepError> {
        let removed = queries::sessions::delete_if_expired(
            self.db()?,
            self.table(),
            session_id,
            now,
            status,
        )
        .await?;
        debug!(session_id, removed, "conditional expiry delete");
        Ok(removed)
    }

    async fn query_index(
        &self,
        key: &IndexKey,
        status: SessionStatus,
    ) -> Result<Vec<PersistedSessionState>, CyclekeepError> {
        queries::sessions::query_index(self.db()?, self.table(), key, status).await
    }

    async fn scan_expired(
        &self,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, CyclekeepError> {
        queries::sessions::scan_expired(self.db()?, self.table(), status, now).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CyclekeepError> {
        queries::sessions::purge_expired(self.db()?, self.table(), now).await
    }
}

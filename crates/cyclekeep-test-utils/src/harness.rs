// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for backend-level integration testing.
//!
//! `TestHarness` hands out an initialized `SessionBackend`, either SQLite
//! in a temp directory or the in-memory backend, so the same scenario can
//! run against both.

use std::sync::Arc;

use cyclekeep_config::model::StorageConfig;
use cyclekeep_core::{CyclekeepError, SessionBackend};
use cyclekeep_storage::SqliteBackend;

use crate::memory_backend::MemoryBackend;

/// Which backend a harness is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessBackend {
    Sqlite,
    Memory,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    backend: HarnessBackend,
    table_name: Option<String>,
    wal_mode: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: HarnessBackend::Sqlite,
            table_name: None,
            wal_mode: true,
        }
    }

    /// Use the in-memory backend instead of SQLite.
    pub fn in_memory(mut self) -> Self {
        self.backend = HarnessBackend::Memory;
        self
    }

    /// Override the SQLite table name.
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Toggle WAL journaling for the SQLite backend.
    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    /// Build the harness and initialize its backend.
    pub async fn build(self) -> Result<TestHarness, CyclekeepError> {
        let temp_dir = tempfile::TempDir::new().map_err(CyclekeepError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let storage_config = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: self.wal_mode,
            table_name: self
                .table_name
                .unwrap_or_else(|| cyclekeep_config::model::DEFAULT_TABLE_NAME.to_string()),
            ..StorageConfig::default()
        };

        let backend: Arc<dyn SessionBackend> = match self.backend {
            HarnessBackend::Sqlite => Arc::new(SqliteBackend::new(storage_config.clone())),
            HarnessBackend::Memory => Arc::new(MemoryBackend::new()),
        };
        backend.initialize().await?;

        Ok(TestHarness {
            kind: self.backend,
            backend,
            storage_config,
            _temp_dir: temp_dir,
        })
    }
}

/// An initialized backend plus the temp directory backing it.
pub struct TestHarness {
    /// Which backend was built.
    pub kind: HarnessBackend,
    /// The initialized backend.
    pub backend: Arc<dyn SessionBackend>,
    /// Storage settings the SQLite backend was opened with.
    pub storage_config: StorageConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A SQLite-backed harness with defaults.
    pub async fn sqlite() -> Result<Self, CyclekeepError> {
        Self::builder().build().await
    }

    /// A memory-backed harness.
    pub async fn memory() -> Result<Self, CyclekeepError> {
        Self::builder().in_memory().build().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclekeep_core::{HealthStatus, PluginAdapter};

    #[tokio::test]
    async fn sqlite_harness_is_initialized() {
        let harness = TestHarness::sqlite().await.unwrap();
        assert_eq!(harness.kind, HarnessBackend::Sqlite);
        assert_eq!(harness.backend.name(), "sqlite");
        assert_eq!(
            harness.backend.health_check().await.unwrap(),
            HealthStatus::Healthy
        );
        assert!(harness.backend.get_item("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_harness_is_initialized() {
        let harness = TestHarness::memory().await.unwrap();
        assert_eq!(harness.backend.name(), "memory");
    }

    #[tokio::test]
    async fn unknown_table_fails_to_build() {
        let result = TestHarness::builder()
            .with_table_name("not_provisioned")
            .build()
            .await;
        assert!(matches!(result, Err(CyclekeepError::Config(_))));
    }
}

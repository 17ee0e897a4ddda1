// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend that fails every call, for exercising error propagation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cyclekeep_core::{
    CyclekeepError, HealthStatus, IndexKey, PersistedSessionState, PluginAdapter,
    SessionBackend, SessionStatus,
};

/// Every operation returns `CyclekeepError::Storage` with the configured message.
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::with_message("simulated backend outage")
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, CyclekeepError> {
        Err(CyclekeepError::storage(std::io::Error::other(
            self.message.clone(),
        )))
    }
}

impl Default for FailingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, CyclekeepError> {
        Ok(HealthStatus::Unhealthy(self.message.clone()))
    }

    async fn shutdown(&self) -> Result<(), CyclekeepError> {
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for FailingBackend {
    async fn initialize(&self) -> Result<(), CyclekeepError> {
        self.fail()
    }

    async fn close(&self) -> Result<(), CyclekeepError> {
        self.fail()
    }

    async fn get_item(&self, _: &str) -> Result<Option<PersistedSessionState>, CyclekeepError> {
        self.fail()
    }

    async fn put_item(&self, _: &PersistedSessionState) -> Result<(), CyclekeepError> {
        self.fail()
    }

    async fn delete_item(&self, _: &str) -> Result<(), CyclekeepError> {
        self.fail()
    }

    async fn update_status(
        &self,
        _: &str,
        _: SessionStatus,
        _: DateTime<Utc>,
        _: Option<SessionStatus>,
    ) -> Result<(), CyclekeepError> {
        self.fail()
    }

    async fn delete_if_expired(
        &self,
        _: &str,
        _: DateTime<Utc>,
        _: Option<SessionStatus>,
    ) -> Result<bool, CyclekeepError> {
        self.fail()
    }

    async fn query_index(
        &self,
        _: &IndexKey,
        _: SessionStatus,
    ) -> Result<Vec<PersistedSessionState>, CyclekeepError> {
        self.fail()
    }

    async fn scan_expired(
        &self,
        _: SessionStatus,
        _: DateTime<Utc>,
    ) -> Result<Vec<String>, CyclekeepError> {
        self.fail()
    }

    async fn purge_expired(&self, _: DateTime<Utc>) -> Result<u64, CyclekeepError> {
        self.fail()
    }
}

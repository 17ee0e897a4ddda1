// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session backend for deterministic testing.
//!
//! `MemoryBackend` implements `SessionBackend` on a `DashMap`. Conditional
//! updates check and write under the shard lock held by `get_mut`, so they
//! are atomic with respect to other callers.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use cyclekeep_core::{
    CyclekeepError, HealthStatus, IndexKey, PersistedSessionState, PluginAdapter,
    SessionBackend, SessionStatus, is_expired_at,
};

/// A session backend that keeps every record in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    items: DashMap<String, PersistedSessionState>,
    index_queries: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a record exists, bypassing expiry.
    pub fn contains(&self, session_id: &str) -> bool {
        self.items.contains_key(session_id)
    }

    /// Raw stored record, bypassing expiry.
    pub fn raw(&self, session_id: &str) -> Option<PersistedSessionState> {
        self.items.get(session_id).map(|entry| entry.value().clone())
    }

    /// Store a record verbatim, bypassing upsert rules. For seeding fixtures.
    pub fn insert_raw(&self, state: PersistedSessionState) {
        self.items.insert(state.session_id().to_string(), state);
    }

    /// How many index queries have been served.
    pub fn index_queries(&self) -> u64 {
        self.index_queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PluginAdapter for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, CyclekeepError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CyclekeepError> {
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn initialize(&self) -> Result<(), CyclekeepError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CyclekeepError> {
        Ok(())
    }

    async fn get_item(
        &self,
        session_id: &str,
    ) -> Result<Option<PersistedSessionState>, CyclekeepError> {
        Ok(self.raw(session_id))
    }

    async fn put_item(&self, state: &PersistedSessionState) -> Result<(), CyclekeepError> {
        self.items
            .entry(state.session_id().to_string())
            .and_modify(|stored| {
                let status = stored.metadata.status;
                let start_time = stored.metadata.start_time;
                *stored = state.clone();
                stored.metadata.status = status;
                stored.metadata.start_time = start_time;
            })
            .or_insert_with(|| state.clone());
        Ok(())
    }

    async fn delete_item(&self, session_id: &str) -> Result<(), CyclekeepError> {
        self.items.remove(session_id);
        Ok(())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
        expected: Option<SessionStatus>,
    ) -> Result<(), CyclekeepError> {
        let precondition_failed = |expected| CyclekeepError::PreconditionFailed {
            session_id: session_id.to_string(),
            expected,
        };

        let Some(mut entry) = self.items.get_mut(session_id) else {
            return match expected {
                Some(expected) => Err(precondition_failed(expected)),
                None => Ok(()),
            };
        };
        if let Some(expected) = expected
            && entry.metadata.status != expected
        {
            return Err(precondition_failed(expected));
        }
        entry.metadata.status = status;
        entry.metadata.last_update_time = updated_at;
        Ok(())
    }

    async fn delete_if_expired(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        status: Option<SessionStatus>,
    ) -> Result<bool, CyclekeepError> {
        let removed = self.items.remove_if(session_id, |_, state| {
            is_expired_at(state.metadata.expires_at, now)
                && status.is_none_or(|status| state.metadata.status == status)
        });
        Ok(removed.is_some())
    }

    async fn query_index(
        &self,
        key: &IndexKey,
        status: SessionStatus,
    ) -> Result<Vec<PersistedSessionState>, CyclekeepError> {
        self.index_queries.fetch_add(1, Ordering::Relaxed);
        let mut found: Vec<PersistedSessionState> = self
            .items
            .iter()
            .filter(|entry| entry.metadata.status == status && key.matches(&entry.metadata))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.metadata.start_time.cmp(&b.metadata.start_time));
        Ok(found)
    }

    async fn scan_expired(
        &self,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, CyclekeepError> {
        Ok(self
            .items
            .iter()
            .filter(|entry| {
                entry.metadata.status == status && is_expired_at(entry.metadata.expires_at, now)
            })
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CyclekeepError> {
        let mut purged = 0u64;
        self.items.retain(|_, state| {
            let expired = is_expired_at(state.metadata.expires_at, now);
            if expired {
                purged += 1;
            }
            !expired
        });
        Ok(purged)
    }
}

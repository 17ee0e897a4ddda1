// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session store: checkpoint, restore, list and finalize cycles.
//!
//! The store holds no locks. Every exclusivity guarantee comes from the
//! backend's atomic conditional status update, so independent process
//! instances can share one table safely.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cyclekeep_core::{
    CyclekeepError, HealthStatus, IndexKey, PersistedSessionState, PluginAdapter,
    RestoredSession, SessionBackend, SessionStatus,
};
use tracing::{debug, info, warn};

use crate::policy::{Resumability, ResumptionPolicy};

/// Per-save options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Overrides the policy's default TTL.
    pub ttl: Option<Duration>,
    /// Persist `state.error`. Off by default so internal failure detail
    /// does not ride along in every checkpoint.
    pub include_error: bool,
}

impl SaveOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn including_error(mut self) -> Self {
        self.include_error = true;
        self
    }
}

/// Scope of a [`SessionStore::list_pending`] query.
///
/// At least one of `user_id` or `guild_id` is required; an unscoped filter
/// lists nothing. When both are set, the user index is queried and
/// `guild_id` narrows the result in memory, so the listing is the
/// intersection of the two scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingFilter {
    pub user_id: Option<String>,
    pub guild_id: Option<String>,
    /// Applied in memory after the indexed query.
    pub channel_id: Option<String>,
    /// Defaults to `RUNNING`.
    pub status: Option<SessionStatus>,
}

impl PendingFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn for_guild(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: Some(guild_id.into()),
            ..Self::default()
        }
    }

    pub fn in_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// The index partition to query. The user index wins when both ids are
    /// present; the guild id is then applied as a post-filter.
    fn index_key(&self) -> Option<IndexKey> {
        match (&self.user_id, &self.guild_id) {
            (Some(user), _) => Some(IndexKey::User(user.clone())),
            (None, Some(guild)) => Some(IndexKey::Guild(guild.clone())),
            (None, None) => None,
        }
    }

    fn post_filter(&self, state: &PersistedSessionState) -> bool {
        let meta = &state.metadata;
        let guild_ok = match (&self.user_id, &self.guild_id) {
            (Some(_), Some(guild)) => meta.guild_id.as_ref() == Some(guild),
            _ => true,
        };
        let channel_ok = self
            .channel_id
            .as_ref()
            .is_none_or(|channel| meta.channel_id.as_ref() == Some(channel));
        guild_ok && channel_ok
    }
}

/// Single source of truth for session checkpoints.
///
/// Built once by the composition root around an injected backend and shared
/// as `Arc<SessionStore>`.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    policy: ResumptionPolicy,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, policy: ResumptionPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &ResumptionPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    /// Upsert a full checkpoint.
    ///
    /// Recomputes `last_update_time` and `expires_at`. On an existing record
    /// the stored status and start time are kept; status only moves through
    /// the transition operations.
    pub async fn save(
        &self,
        session_id: &str,
        mut state: PersistedSessionState,
        options: SaveOptions,
    ) -> Result<(), CyclekeepError> {
        if session_id.is_empty() {
            return Err(CyclekeepError::Validation(
                "session id must not be empty".to_string(),
            ));
        }
        if state.metadata.session_id.is_empty() {
            state.metadata.session_id = session_id.to_string();
        } else if state.metadata.session_id != session_id {
            return Err(CyclekeepError::Validation(format!(
                "state belongs to session `{}`, not `{session_id}`",
                state.metadata.session_id
            )));
        }

        let now = Utc::now();
        state.metadata.last_update_time = now;
        state.metadata.expires_at = self.policy.expires_at(now, options.ttl);
        if !options.include_error {
            state.error = None;
        }

        self.backend.put_item(&state).await?;
        debug!(
            session_id,
            expires_at = state.metadata.expires_at,
            "session checkpoint saved"
        );
        Ok(())
    }

    /// Read a checkpoint back.
    ///
    /// Returns `None` when absent. An expired record is deleted and also
    /// reported as `None`, even if the backend has not reaped it yet.
    pub async fn restore(
        &self,
        session_id: &str,
    ) -> Result<Option<RestoredSession>, CyclekeepError> {
        let Some(state) = self.backend.get_item(session_id).await? else {
            debug!(session_id, "no session to restore");
            return Ok(None);
        };

        let now = Utc::now();
        let resumable = match self.policy.evaluate(&state, now) {
            Resumability::Expired => {
                let removed = self.backend.delete_if_expired(session_id, now, None).await?;
                debug!(session_id, removed, "restored session had expired");
                return Ok(None);
            }
            Resumability::Resumable => true,
            Resumability::NotRunning(status) => {
                debug!(session_id, %status, "restored session is not resumable");
                false
            }
        };

        let elapsed_ms = self.policy.elapsed_ms(&state.metadata, now);
        Ok(Some(RestoredSession {
            state,
            resumable,
            elapsed_ms,
        }))
    }

    /// List candidate sessions for one user or guild.
    ///
    /// An unscoped filter returns nothing without touching the backend.
    /// Results come from a secondary index and may be stale: re-validate
    /// with [`update_status_if`](Self::update_status_if) before acting.
    pub async fn list_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<PersistedSessionState>, CyclekeepError> {
        let Some(key) = filter.index_key() else {
            warn!("rejected unscoped pending-session query: user_id or guild_id is required");
            return Ok(Vec::new());
        };
        let status = filter.status.unwrap_or(SessionStatus::Running);

        let now = Utc::now();
        let mut items = self.backend.query_index(&key, status).await?;
        items.retain(|state| {
            filter.post_filter(state) && !self.policy.is_expired(&state.metadata, now)
        });

        debug!(
            index = key.attribute(),
            %status,
            count = items.len(),
            "listed pending sessions"
        );
        Ok(items)
    }

    /// Remove a session. Removing a missing session is not an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), CyclekeepError> {
        self.backend.delete_item(session_id).await?;
        debug!(session_id, "session deleted");
        Ok(())
    }

    /// Unconditionally overwrite the status. Administrative use only.
    pub async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), CyclekeepError> {
        self.backend
            .update_status(session_id, status, Utc::now(), None)
            .await?;
        info!(session_id, %status, "session status overwritten");
        Ok(())
    }

    /// Move `expected -> new` only if the stored status is still `expected`.
    ///
    /// Returns `Ok(false)` when another writer got there first or the record
    /// is gone. That outcome is routine under races and is not logged as an
    /// error.
    pub async fn update_status_if(
        &self,
        session_id: &str,
        new: SessionStatus,
        expected: SessionStatus,
    ) -> Result<bool, CyclekeepError> {
        if !expected.can_transition_to(new) {
            return Err(CyclekeepError::InvalidTransition {
                from: expected,
                to: new,
            });
        }

        match self
            .backend
            .update_status(session_id, new, Utc::now(), Some(expected))
            .await
        {
            Ok(()) => {
                debug!(session_id, from = %expected, to = %new, "session status transitioned");
                Ok(true)
            }
            Err(CyclekeepError::PreconditionFailed { .. }) => {
                debug!(
                    session_id,
                    %expected,
                    "conditional status update not applied: precondition failed"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Record the terminal outcome of a running cycle.
    ///
    /// Exactly one of several concurrent finalizers gets `true`; the others
    /// must treat their own work as superseded.
    pub async fn finalize(
        &self,
        session_id: &str,
        terminal: SessionStatus,
    ) -> Result<bool, CyclekeepError> {
        if !terminal.is_terminal() {
            return Err(CyclekeepError::Validation(format!(
                "{terminal} is not a terminal status"
            )));
        }
        let applied = self
            .update_status_if(session_id, terminal, SessionStatus::Running)
            .await?;
        if !applied {
            debug!(session_id, %terminal, "finalization superseded by another writer");
        }
        Ok(applied)
    }

    /// Delete every `RUNNING` session whose expiry has elapsed.
    ///
    /// Full scan. Maintenance only, never on a request path. Each delete
    /// re-checks expiry and status, so a session re-saved after the scan is
    /// kept and not counted.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, CyclekeepError> {
        let now = Utc::now();
        let ids = self
            .backend
            .scan_expired(SessionStatus::Running, now)
            .await?;

        let mut removed = 0u64;
        for id in &ids {
            if self
                .backend
                .delete_if_expired(id, now, Some(SessionStatus::Running))
                .await?
            {
                removed += 1;
            } else {
                debug!(session_id = %id, "expired session refreshed before cleanup, kept");
            }
        }

        if removed > 0 {
            info!(removed, "expired running sessions cleaned up");
        } else {
            debug!("no expired running sessions");
        }
        Ok(removed)
    }

    /// Ask the backend to drop every expired record regardless of status.
    pub async fn purge_expired(&self) -> Result<u64, CyclekeepError> {
        let purged = self.backend.purge_expired(Utc::now()).await?;
        debug!(purged, "passive expiry purge complete");
        Ok(purged)
    }

    pub async fn health_check(&self) -> Result<HealthStatus, CyclekeepError> {
        self.backend.health_check().await
    }

    /// Flush and release the backend.
    pub async fn close(&self) -> Result<(), CyclekeepError> {
        self.backend.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclekeep_core::SessionMetadata;
    use cyclekeep_test_utils::MemoryBackend;
    use serde_json::json;
    use tracing_test::traced_test;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryBackend::new()), ResumptionPolicy::default())
    }

    fn running(id: &str) -> PersistedSessionState {
        PersistedSessionState::new(SessionMetadata::new(id).with_user("u1"), json!({"step": 1}))
    }

    #[test]
    fn filter_prefers_user_index() {
        let filter = PendingFilter {
            user_id: Some("u1".into()),
            guild_id: Some("g1".into()),
            ..PendingFilter::default()
        };
        assert_eq!(filter.index_key(), Some(IndexKey::User("u1".into())));
        assert_eq!(
            PendingFilter::for_guild("g1").index_key(),
            Some(IndexKey::Guild("g1".into()))
        );
        assert_eq!(PendingFilter::default().index_key(), None);
    }

    #[test]
    fn post_filter_checks_guild_only_when_user_indexed() {
        let state = PersistedSessionState::new(
            SessionMetadata::new("s1").with_user("u1").with_guild("g2").with_channel("c1"),
            json!({}),
        );
        let mut filter = PendingFilter::for_user("u1");
        assert!(filter.post_filter(&state));
        filter.guild_id = Some("g1".into());
        assert!(!filter.post_filter(&state));
        filter.guild_id = Some("g2".into());
        assert!(filter.clone().in_channel("c1").post_filter(&state));
        assert!(!filter.in_channel("c9").post_filter(&state));
    }

    #[tokio::test]
    async fn save_rejects_mismatched_ids() {
        let store = store();
        let err = store
            .save("other", running("s1"), SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CyclekeepError::Validation(_)));

        let err = store
            .save("", running("s1"), SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CyclekeepError::Validation(_)));
    }

    #[tokio::test]
    async fn save_fills_in_missing_metadata_id() {
        let store = store();
        store
            .save("s1", running(""), SaveOptions::default())
            .await
            .unwrap();
        let restored = store.restore("s1").await.unwrap().unwrap();
        assert_eq!(restored.state.session_id(), "s1");
    }

    #[tokio::test]
    async fn error_is_dropped_unless_requested() {
        let store = store();
        let state = running("s1").with_error("provider timeout");

        store.save("s1", state.clone(), SaveOptions::default()).await.unwrap();
        let restored = store.restore("s1").await.unwrap().unwrap();
        assert_eq!(restored.state.error, None);

        store
            .save("s1", state, SaveOptions::default().including_error())
            .await
            .unwrap();
        let restored = store.restore("s1").await.unwrap().unwrap();
        assert_eq!(restored.state.error.as_deref(), Some("provider timeout"));
    }

    #[tokio::test]
    async fn illegal_edges_are_rejected_before_the_backend() {
        let store = store();
        let err = store
            .update_status_if("s1", SessionStatus::Running, SessionStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CyclekeepError::InvalidTransition {
                from: SessionStatus::Completed,
                to: SessionStatus::Running
            }
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn lost_finalization_race_is_not_an_error_log() {
        let store = store();
        store
            .save("s1", running("s1"), SaveOptions::default())
            .await
            .unwrap();

        assert!(store.finalize("s1", SessionStatus::Completed).await.unwrap());
        assert!(!store.finalize("s1", SessionStatus::Failed).await.unwrap());

        assert!(logs_contain("precondition failed"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().find(|line| line.contains("ERROR")) {
                Some(line) => Err(format!("unexpected error-level log: {line}")),
                None => Ok(()),
            }
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn unscoped_listing_warns_and_skips_the_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::new(backend.clone(), ResumptionPolicy::default());

        let listed = store
            .list_pending(&PendingFilter::default().in_channel("c1"))
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert_eq!(backend.index_queries(), 0);
        assert!(logs_contain("rejected unscoped pending-session query"));
    }

    #[tokio::test]
    async fn finalize_requires_terminal_status() {
        let store = store();
        let err = store.finalize("s1", SessionStatus::Pending).await.unwrap_err();
        assert!(matches!(err, CyclekeepError::Validation(_)));
    }
}

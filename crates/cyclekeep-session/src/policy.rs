// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumption and expiry rules.
//!
//! A restored session may be actively resumed only if it exists, has not
//! expired, and is `RUNNING`. There is no separate claim step: protection
//! against double execution lives on the finalization edge, where
//! `update_status_if(id, terminal, RUNNING)` succeeds for exactly one caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use cyclekeep_config::model::SessionConfig;
use cyclekeep_core::{PersistedSessionState, SessionMetadata, SessionStatus, is_expired_at};

/// Outcome of evaluating a restored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumability {
    /// Live and `RUNNING`.
    Resumable,
    /// `expires_at` has elapsed; the record is logically deleted.
    Expired,
    /// Live, but in a status that cannot be resumed.
    NotRunning(SessionStatus),
}

impl Resumability {
    pub fn is_resumable(self) -> bool {
        self == Resumability::Resumable
    }
}

/// TTL and resumability policy applied by the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumptionPolicy {
    default_ttl: Duration,
}

impl Default for ResumptionPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(cyclekeep_config::model::DEFAULT_TTL_SECS))
    }
}

impl ResumptionPolicy {
    pub fn new(default_ttl: Duration) -> Self {
        Self { default_ttl }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.default_ttl())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Epoch seconds at which a record saved at `now` expires.
    ///
    /// `ttl` falls back to the policy default. Saturates instead of
    /// overflowing for absurdly large TTLs.
    pub fn expires_at(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> i64 {
        let ttl_secs = ttl.unwrap_or(self.default_ttl).as_secs();
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        now.timestamp().saturating_add(ttl_secs)
    }

    pub fn is_expired(&self, metadata: &SessionMetadata, now: DateTime<Utc>) -> bool {
        is_expired_at(metadata.expires_at, now)
    }

    /// Decide whether `state` may be resumed at `now`. Expiry wins over status.
    pub fn evaluate(&self, state: &PersistedSessionState, now: DateTime<Utc>) -> Resumability {
        if self.is_expired(&state.metadata, now) {
            Resumability::Expired
        } else if state.status().is_resumable() {
            Resumability::Resumable
        } else {
            Resumability::NotRunning(state.status())
        }
    }

    /// Milliseconds between `start_time` and `now`, clamped at zero for
    /// clock skew between writers.
    pub fn elapsed_ms(&self, metadata: &SessionMetadata, now: DateTime<Utc>) -> i64 {
        (now - metadata.start_time).num_milliseconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn state(status: SessionStatus, expires_at: i64) -> PersistedSessionState {
        let mut metadata = SessionMetadata::new("s1").with_status(status);
        metadata.expires_at = expires_at;
        PersistedSessionState::new(metadata, json!({}))
    }

    #[test]
    fn default_ttl_is_one_hour() {
        assert_eq!(ResumptionPolicy::default().default_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn expires_at_uses_override_then_default() {
        let policy = ResumptionPolicy::new(Duration::from_secs(60));
        assert_eq!(policy.expires_at(at(1_000), None), 1_060);
        assert_eq!(policy.expires_at(at(1_000), Some(Duration::from_secs(5))), 1_005);
        assert_eq!(policy.expires_at(at(1_000), Some(Duration::ZERO)), 1_000);
    }

    #[test]
    fn huge_ttl_saturates() {
        let policy = ResumptionPolicy::default();
        assert_eq!(policy.expires_at(at(1_000), Some(Duration::MAX)), i64::MAX);
    }

    #[test]
    fn evaluate_covers_each_outcome() {
        let policy = ResumptionPolicy::default();
        let now = at(10_000);

        assert_eq!(
            policy.evaluate(&state(SessionStatus::Running, 20_000), now),
            Resumability::Resumable
        );
        assert_eq!(
            policy.evaluate(&state(SessionStatus::Completed, 20_000), now),
            Resumability::NotRunning(SessionStatus::Completed)
        );
        assert_eq!(
            policy.evaluate(&state(SessionStatus::Running, 10_000), now),
            Resumability::Expired
        );
        assert_eq!(
            policy.evaluate(&state(SessionStatus::Failed, 5_000), now),
            Resumability::Expired
        );
    }

    #[test]
    fn elapsed_is_never_negative() {
        let policy = ResumptionPolicy::default();
        let mut metadata = SessionMetadata::new("s1");
        metadata.start_time = at(2_000);
        assert_eq!(policy.elapsed_ms(&metadata, at(1_000)), 0);
        assert_eq!(policy.elapsed_ms(&metadata, at(2_003)), 3_000);
    }

    proptest! {
        #[test]
        fn saved_record_is_live_until_ttl_elapses(
            now in 0i64..4_000_000_000,
            ttl in 1u64..1_000_000,
        ) {
            let policy = ResumptionPolicy::default();
            let saved_at = at(now);
            let expires_at = policy.expires_at(saved_at, Some(Duration::from_secs(ttl)));
            let s = state(SessionStatus::Running, expires_at);

            prop_assert_eq!(policy.evaluate(&s, saved_at), Resumability::Resumable);
            prop_assert_eq!(
                policy.evaluate(&s, at(now + ttl as i64)),
                Resumability::Expired
            );
        }

        #[test]
        fn only_running_is_ever_resumable(idx in 0usize..5) {
            let policy = ResumptionPolicy::default();
            let status = SessionStatus::ALL[idx];
            let s = state(status, i64::MAX / 1000);
            prop_assert_eq!(
                policy.evaluate(&s, at(0)).is_resumable(),
                status == SessionStatus::Running
            );
        }
    }
}

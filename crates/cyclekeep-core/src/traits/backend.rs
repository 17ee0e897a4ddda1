// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backend contract for session records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CyclekeepError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{IndexKey, PersistedSessionState, SessionStatus};

/// A keyed store for session records.
///
/// Implementations must evaluate [`update_status`](Self::update_status) with
/// an expected status as one indivisible operation, even under concurrent
/// writers from other processes. Everything else only needs read-after-write
/// consistency on the primary key.
#[async_trait]
pub trait SessionBackend: PluginAdapter {
    /// Opens connections and verifies provisioning.
    async fn initialize(&self) -> Result<(), CyclekeepError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), CyclekeepError>;

    /// Reads one record by primary key.
    async fn get_item(
        &self,
        session_id: &str,
    ) -> Result<Option<PersistedSessionState>, CyclekeepError>;

    /// Upserts a record.
    ///
    /// When a record with the same key exists, its `status` and
    /// `start_time` are kept and every other field is overwritten.
    async fn put_item(&self, state: &PersistedSessionState) -> Result<(), CyclekeepError>;

    /// Removes a record. Removing a missing record is not an error.
    async fn delete_item(&self, session_id: &str) -> Result<(), CyclekeepError>;

    /// Sets `status` and `last_update_time`.
    ///
    /// With `expected = Some(s)` the write applies only if the stored status
    /// equals `s`; otherwise [`CyclekeepError::PreconditionFailed`] is
    /// returned. A missing record also fails the precondition. With
    /// `expected = None` a missing record is left missing.
    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
        expected: Option<SessionStatus>,
    ) -> Result<(), CyclekeepError>;

    /// Removes a record only if its expiry has elapsed at `now` and, when
    /// `status` is given, it is still in that status. Check and delete are
    /// one operation, so a record re-saved with a fresh TTL after it was
    /// read survives. Returns whether a record was removed.
    async fn delete_if_expired(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        status: Option<SessionStatus>,
    ) -> Result<bool, CyclekeepError>;

    /// Range query on a secondary index partition for one status.
    ///
    /// Results may be eventually consistent.
    async fn query_index(
        &self,
        key: &IndexKey,
        status: SessionStatus,
    ) -> Result<Vec<PersistedSessionState>, CyclekeepError>;

    /// Full scan for ids with the given status whose expiry has elapsed.
    async fn scan_expired(
        &self,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, CyclekeepError>;

    /// Backend-native passive expiry: drops every record, in any status,
    /// whose expiry has elapsed. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CyclekeepError>;
}

/// Whether a record with `expires_at` (epoch seconds) is expired at `now`.
///
/// Compared at millisecond resolution so that a zero TTL expires at once.
pub fn is_expired_at(expires_at: i64, now: DateTime<Utc>) -> bool {
    now.timestamp_millis() >= expires_at.saturating_mul(1000)
}

/// The largest `expires_at` (epoch seconds) that counts as expired at `now`.
///
/// `expires_at <= expiry_cutoff(now)` selects exactly the records for which
/// [`is_expired_at`] holds, without arithmetic on the stored column.
pub fn expiry_cutoff(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().div_euclid(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zero_ttl_is_expired_immediately() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert!(is_expired_at(now.timestamp(), now));
    }

    #[test]
    fn future_expiry_is_live() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_500).unwrap();
        assert!(!is_expired_at(now.timestamp() + 1, now));
        assert!(is_expired_at(now.timestamp(), now));
    }

    #[test]
    fn cutoff_agrees_with_expiry_rule() {
        for now_ms in [1_700_000_000_000, 1_700_000_000_999, -1_500, -1_000] {
            let now = Utc.timestamp_millis_opt(now_ms).unwrap();
            let cutoff = expiry_cutoff(now);
            for expires_at in [cutoff - 1, cutoff, cutoff + 1] {
                assert_eq!(
                    expires_at <= cutoff,
                    is_expired_at(expires_at, now),
                    "now_ms={now_ms} expires_at={expires_at}"
                );
            }
        }
    }
}

// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row encoding for session records.
//!
//! The canonical types live in `cyclekeep-core::types`. This module maps
//! them to and from the column layout of the session table.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub use cyclekeep_core::types::{PersistedSessionState, SessionMetadata, SessionStatus};

/// Column list shared by every SELECT, in [`state_from_row`] order.
pub(crate) const COLUMNS: &str = "session_id, user_id, guild_id, channel_id, status, \
     start_time, last_update_time, expires_at, theta_state, context, error";

/// Fixed-width RFC 3339 with nanoseconds, so stored timestamps round-trip
/// exactly and still sort lexicographically.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_failure(
    column: usize,
    ty: Type,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, err.into())
}

fn timestamp_at(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_failure(column, Type::Text, e))
}

fn json_at(row: &Row<'_>, column: usize) -> rusqlite::Result<serde_json::Value> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| conversion_failure(column, Type::Text, e))
}

pub(crate) fn status_at(row: &Row<'_>, column: usize) -> rusqlite::Result<SessionStatus> {
    let text: String = row.get(column)?;
    SessionStatus::from_str(&text).map_err(|e| conversion_failure(column, Type::Text, e))
}

/// Decode a row selected with [`COLUMNS`].
pub(crate) fn state_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedSessionState> {
    Ok(PersistedSessionState {
        metadata: SessionMetadata {
            session_id: row.get(0)?,
            user_id: row.get(1)?,
            guild_id: row.get(2)?,
            channel_id: row.get(3)?,
            status: status_at(row, 4)?,
            start_time: timestamp_at(row, 5)?,
            last_update_time: timestamp_at(row, 6)?,
            expires_at: row.get(7)?,
        },
        theta_state: json_at(row, 8)?,
        context: json_at(row, 9)?,
        error: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_keep_nanoseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let text = format_timestamp(&ts);
        assert_eq!(text, "2023-11-14T22:13:20.123456789Z");
        let back = DateTime::parse_from_rfc3339(&text).unwrap().with_timezone(&Utc);
        assert_eq!(back, ts);
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let a = Utc.timestamp_opt(1_700_000_000, 5).unwrap();
        let b = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
        assert!(format_timestamp(&a) < format_timestamp(&b));
    }
}

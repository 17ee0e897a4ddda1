// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session record operations.
//!
//! Every function takes the table name explicitly. Callers validate it as a
//! plain identifier before it reaches here.

use chrono::{DateTime, Utc};
use cyclekeep_core::{CyclekeepError, IndexKey, expiry_cutoff};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{COLUMNS, PersistedSessionState, SessionStatus, format_timestamp, state_from_row};

/// Get one record by primary key.
pub async fn get_session(
    db: &Database,
    table: &str,
    session_id: &str,
) -> Result<Option<PersistedSessionState>, CyclekeepError> {
    let sql = format!("SELECT {COLUMNS} FROM {table} WHERE session_id = ?1");
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, rusqlite::Error> {
            conn.query_row(&sql, params![session_id], state_from_row)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite a record.
///
/// On conflict the stored `status` and `start_time` are left untouched;
/// status only moves through [`update_status`].
pub async fn upsert_session(
    db: &Database,
    table: &str,
    state: &PersistedSessionState,
) -> Result<(), CyclekeepError> {
    let sql = format!(
        "INSERT INTO {table} ({COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(session_id) DO UPDATE SET
             user_id = excluded.user_id,
             guild_id = excluded.guild_id,
             channel_id = excluded.channel_id,
             last_update_time = excluded.last_update_time,
             expires_at = excluded.expires_at,
             theta_state = excluded.theta_state,
             context = excluded.context,
             error = excluded.error"
    );
    let state = state.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let meta = &state.metadata;
            conn.execute(
                &sql,
                params![
                    meta.session_id,
                    meta.user_id,
                    meta.guild_id,
                    meta.channel_id,
                    meta.status.to_string(),
                    format_timestamp(&meta.start_time),
                    format_timestamp(&meta.last_update_time),
                    meta.expires_at,
                    state.theta_state.to_string(),
                    state.context.to_string(),
                    state.error,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a record. Returns whether a row was removed.
pub async fn delete_session(
    db: &Database,
    table: &str,
    session_id: &str,
) -> Result<bool, CyclekeepError> {
    let sql = format!("DELETE FROM {table} WHERE session_id = ?1");
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            Ok(conn.execute(&sql, params![session_id])? > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Set the status, optionally guarded by the currently stored status.
///
/// The guard is part of the single UPDATE statement, so the check and the
/// write cannot interleave with another writer. Returns rows changed (0 or 1).
pub async fn update_status(
    db: &Database,
    table: &str,
    session_id: &str,
    status: SessionStatus,
    updated_at: DateTime<Utc>,
    expected: Option<SessionStatus>,
) -> Result<usize, CyclekeepError> {
    let session_id = session_id.to_string();
    let status = status.to_string();
    let updated_at = format_timestamp(&updated_at);
    let expected = expected.map(|s| s.to_string());
    let sql = match expected {
        Some(_) => format!(
            "UPDATE {table} SET status = ?1, last_update_time = ?2
             WHERE session_id = ?3 AND status = ?4"
        ),
        None => format!(
            "UPDATE {table} SET status = ?1, last_update_time = ?2
             WHERE session_id = ?3"
        ),
    };
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            match expected {
                Some(expected) => {
                    conn.execute(&sql, params![status, updated_at, session_id, expected])
                }
                None => conn.execute(&sql, params![status, updated_at, session_id]),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Query one `(attribute, status)` index partition.
pub async fn query_index(
    db: &Database,
    table: &str,
    key: &IndexKey,
    status: SessionStatus,
) -> Result<Vec<PersistedSessionState>, CyclekeepError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM {table} WHERE {} = ?1 AND status = ?2",
        key.attribute()
    );
    let value = key.value().to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<PersistedSessionState>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![value, status], state_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete one record if it has expired at `now`, optionally only while it
/// is in `status`. Returns whether a row was removed.
pub async fn delete_if_expired(
    db: &Database,
    table: &str,
    session_id: &str,
    now: DateTime<Utc>,
    status: Option<SessionStatus>,
) -> Result<bool, CyclekeepError> {
    let session_id = session_id.to_string();
    let cutoff = expiry_cutoff(now);
    let status = status.map(|s| s.to_string());
    let sql = match status {
        Some(_) => format!(
            "DELETE FROM {table} WHERE session_id = ?1 AND expires_at <= ?2 AND status = ?3"
        ),
        None => format!("DELETE FROM {table} WHERE session_id = ?1 AND expires_at <= ?2"),
    };
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let removed = match status {
                Some(status) => conn.execute(&sql, params![session_id, cutoff, status])?,
                None => conn.execute(&sql, params![session_id, cutoff])?,
            };
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of records in `status` whose expiry has elapsed at `now`.
pub async fn scan_expired(
    db: &Database,
    table: &str,
    status: SessionStatus,
    now: DateTime<Utc>,
) -> Result<Vec<String>, CyclekeepError> {
    let sql = format!(
        "SELECT session_id FROM {table} WHERE status = ?1 AND expires_at <= ?2"
    );
    let status = status.to_string();
    let cutoff = expiry_cutoff(now);
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![status, cutoff], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every record whose expiry has elapsed, whatever its status.
pub async fn purge_expired(
    db: &Database,
    table: &str,
    now: DateTime<Utc>,
) -> Result<u64, CyclekeepError> {
    let sql = format!("DELETE FROM {table} WHERE expires_at <= ?1");
    let cutoff = expiry_cutoff(now);
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            Ok(conn.execute(&sql, params![cutoff])? as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Whether `table` exists in the database.
pub async fn table_exists(db: &Database, table: &str) -> Result<bool, CyclekeepError> {
    let table = table.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![table],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionMetadata;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    const TABLE: &str = "cycle_sessions";

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_state(id: &str, user: &str, expires_at: i64) -> PersistedSessionState {
        let mut metadata = SessionMetadata::new(id).with_user(user).with_guild("g1");
        metadata.expires_at = expires_at;
        PersistedSessionState::new(metadata, json!({"step": 1}))
            .with_context(json!({"request": "summarize"}))
    }

    fn far_future() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrips() {
        let (db, _dir) = setup_db().await;
        let state = make_state("s1", "u1", far_future()).with_error("boom");

        upsert_session(&db, TABLE, &state).await.unwrap();
        let back = get_session(&db, TABLE, "s1").await.unwrap().unwrap();
        assert_eq!(back, state);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_session(&db, TABLE, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_keeps_status_and_start_time() {
        let (db, _dir) = setup_db().await;
        let first = make_state("s1", "u1", far_future());
        upsert_session(&db, TABLE, &first).await.unwrap();

        let mut second = make_state("s1", "u1", far_future());
        second.metadata.status = SessionStatus::Failed;
        second.metadata.start_time = first.metadata.start_time + Duration::seconds(30);
        second.theta_state = json!({"step": 7});
        upsert_session(&db, TABLE, &second).await.unwrap();

        let back = get_session(&db, TABLE, "s1").await.unwrap().unwrap();
        assert_eq!(back.metadata.status, SessionStatus::Running);
        assert_eq!(back.metadata.start_time, first.metadata.start_time);
        assert_eq!(back.theta_state, json!({"step": 7}));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn guarded_update_applies_once() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, TABLE, &make_state("s1", "u1", far_future()))
            .await
            .unwrap();

        let now = Utc::now();
        let first = update_status(
            &db,
            TABLE,
            "s1",
            SessionStatus::Completed,
            now,
            Some(SessionStatus::Running),
        )
        .await
        .unwrap();
        let second = update_status(
            &db,
            TABLE,
            "s1",
            SessionStatus::Failed,
            now,
            Some(SessionStatus::Running),
        )
        .await
        .unwrap();
        assert_eq!((first, second), (1, 0));

        let back = get_session(&db, TABLE, "s1").await.unwrap().unwrap();
        assert_eq!(back.metadata.status, SessionStatus::Completed);
        assert_eq!(back.metadata.last_update_time, now);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unguarded_update_on_missing_row_changes_nothing() {
        let (db, _dir) = setup_db().await;
        let changed = update_status(&db, TABLE, "ghost", SessionStatus::Cancelled, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert!(get_session(&db, TABLE, "ghost").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn index_query_is_scoped_by_partition_and_status() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, TABLE, &make_state("a", "u1", far_future())).await.unwrap();
        upsert_session(&db, TABLE, &make_state("b", "u1", far_future())).await.unwrap();
        upsert_session(&db, TABLE, &make_state("c", "u2", far_future())).await.unwrap();
        update_status(&db, TABLE, "b", SessionStatus::Completed, Utc::now(), None)
            .await
            .unwrap();

        let running = query_index(&db, TABLE, &IndexKey::User("u1".into()), SessionStatus::Running)
            .await
            .unwrap();
        let ids: Vec<_> = running.iter().map(|s| s.session_id()).collect();
        assert_eq!(ids, vec!["a"]);

        let guild = query_index(&db, TABLE, &IndexKey::Guild("g1".into()), SessionStatus::Running)
            .await
            .unwrap();
        assert_eq!(guild.len(), 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scan_and_purge_respect_expiry() {
        let (db, _dir) = setup_db().await;
        let past = Utc::now().timestamp() - 10;
        upsert_session(&db, TABLE, &make_state("old-running", "u1", past)).await.unwrap();
        upsert_session(&db, TABLE, &make_state("old-done", "u1", past)).await.unwrap();
        upsert_session(&db, TABLE, &make_state("fresh", "u1", far_future())).await.unwrap();
        update_status(&db, TABLE, "old-done", SessionStatus::Completed, Utc::now(), None)
            .await
            .unwrap();

        let expired = scan_expired(&db, TABLE, SessionStatus::Running, Utc::now())
            .await
            .unwrap();
        assert_eq!(expired, vec!["old-running".to_string()]);

        let purged = purge_expired(&db, TABLE, Utc::now()).await.unwrap();
        assert_eq!(purged, 2);
        assert!(get_session(&db, TABLE, "fresh").await.unwrap().is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conditional_expiry_delete_spares_refreshed_rows() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let past = now.timestamp() - 10;
        upsert_session(&db, TABLE, &make_state("stale", "u1", past)).await.unwrap();
        upsert_session(&db, TABLE, &make_state("refreshed", "u1", past)).await.unwrap();
        upsert_session(&db, TABLE, &make_state("done", "u1", past)).await.unwrap();
        update_status(&db, TABLE, "done", SessionStatus::Completed, now, None)
            .await
            .unwrap();

        // Re-saved with a fresh TTL after a sweep would have listed it.
        upsert_session(&db, TABLE, &make_state("refreshed", "u1", far_future()))
            .await
            .unwrap();

        let running = Some(SessionStatus::Running);
        assert!(delete_if_expired(&db, TABLE, "stale", now, running).await.unwrap());
        assert!(!delete_if_expired(&db, TABLE, "refreshed", now, running).await.unwrap());
        assert!(!delete_if_expired(&db, TABLE, "done", now, running).await.unwrap());
        assert!(!delete_if_expired(&db, TABLE, "missing", now, None).await.unwrap());
        assert!(delete_if_expired(&db, TABLE, "done", now, None).await.unwrap());

        assert!(get_session(&db, TABLE, "refreshed").await.unwrap().is_some());
        assert!(get_session(&db, TABLE, "stale").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expiry_filters_use_the_expiry_indexes() {
        let (db, _dir) = setup_db().await;
        let plans = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut details = Vec::new();
                for sql in [
                    "EXPLAIN QUERY PLAN SELECT session_id FROM cycle_sessions \
                     WHERE status = 'RUNNING' AND expires_at <= 0",
                    "EXPLAIN QUERY PLAN DELETE FROM cycle_sessions WHERE expires_at <= 0",
                ] {
                    let mut stmt = conn.prepare(sql)?;
                    let rows = stmt.query_map([], |row| row.get::<_, String>(3))?;
                    details.push(rows.collect::<Result<Vec<_>, _>>()?.join("; "));
                }
                Ok(details)
            })
            .await
            .unwrap();

        for plan in &plans {
            assert!(plan.contains("USING"), "expected an index search: {plan}");
            assert!(plan.contains("expires_at"), "expected the expiry index: {plan}");
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, TABLE, &make_state("s1", "u1", far_future())).await.unwrap();
        assert!(delete_session(&db, TABLE, "s1").await.unwrap());
        assert!(!delete_session(&db, TABLE, "s1").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn table_exists_checks_provisioning() {
        let (db, _dir) = setup_db().await;
        assert!(table_exists(&db, TABLE).await.unwrap());
        assert!(!table_exists(&db, "not_provisioned").await.unwrap());
        db.close().await.unwrap();
    }
}

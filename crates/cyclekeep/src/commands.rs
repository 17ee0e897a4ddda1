// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot administrative commands.
//!
//! Each command runs a single store operation under the configured deadline
//! and returns a JSON value for stdout.

use std::future::Future;
use std::time::Duration;

use cyclekeep_core::{CyclekeepError, HealthStatus, PluginAdapter, SessionStatus};
use cyclekeep_session::{PendingFilter, SessionStore};
use serde_json::{Value, json};

/// Run `fut` with a deadline. An elapsed deadline is a transient
/// [`CyclekeepError::Timeout`] and is safe to retry.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, CyclekeepError>>,
) -> Result<T, CyclekeepError> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| CyclekeepError::Timeout { duration: deadline })?
}

fn to_json(value: impl serde::Serialize) -> Result<Value, CyclekeepError> {
    serde_json::to_value(value).map_err(|e| CyclekeepError::Internal(e.to_string()))
}

/// `cyclekeep show <id>`
pub async fn show(store: &SessionStore, session_id: &str) -> Result<Value, CyclekeepError> {
    match store.restore(session_id).await? {
        Some(restored) => to_json(restored),
        None => Ok(Value::Null),
    }
}

/// `cyclekeep list`
pub async fn list(store: &SessionStore, filter: &PendingFilter) -> Result<Value, CyclekeepError> {
    let sessions = store.list_pending(filter).await?;
    to_json(sessions)
}

/// `cyclekeep delete <id>`
pub async fn delete(store: &SessionStore, session_id: &str) -> Result<Value, CyclekeepError> {
    store.delete_session(session_id).await?;
    Ok(json!({ "deleted": session_id }))
}

/// `cyclekeep set-status <id> <status> [--expect <status>]`
///
/// Without `--expect` this is the unconditional administrative overwrite.
pub async fn set_status(
    store: &SessionStore,
    session_id: &str,
    status: SessionStatus,
    expect: Option<SessionStatus>,
) -> Result<Value, CyclekeepError> {
    let applied = match expect {
        Some(expected) => store.update_status_if(session_id, status, expected).await?,
        None => {
            store.update_status(session_id, status).await?;
            true
        }
    };
    Ok(json!({
        "sessionId": session_id,
        "status": status,
        "applied": applied,
    }))
}

/// `cyclekeep cleanup`
pub async fn cleanup(store: &SessionStore) -> Result<Value, CyclekeepError> {
    let removed = store.cleanup_expired_sessions().await?;
    Ok(json!({ "removed": removed }))
}

/// `cyclekeep health`
pub async fn health(store: &SessionStore) -> Result<Value, CyclekeepError> {
    let backend = store.backend().name().to_string();
    let (status, detail) = match store.health_check().await? {
        HealthStatus::Healthy => ("healthy", None),
        HealthStatus::Degraded(detail) => ("degraded", Some(detail)),
        HealthStatus::Unhealthy(detail) => ("unhealthy", Some(detail)),
    };
    Ok(json!({
        "backend": backend,
        "status": status,
        "detail": detail,
    }))
}

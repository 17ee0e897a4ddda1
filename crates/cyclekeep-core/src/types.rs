// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session record model and the status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by backend health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy,
    /// Backend is operational but experiencing issues.
    Degraded(String),
    /// Backend is not operational.
    Unhealthy(String),
}

/// Lifecycle status of a cycle.
///
/// `Running` is the only resumable state. `Completed`, `Failed` and
/// `Cancelled` are terminal and are never left once entered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Registered but not yet started.
    Pending,
    /// In progress; may be resumed after an interruption.
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Pending,
        SessionStatus::Running,
        SessionStatus::Completed,
        SessionStatus::Failed,
        SessionStatus::Cancelled,
    ];

    /// Whether this status ends the lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Whether a session in this status may be actively resumed.
    pub fn is_resumable(self) -> bool {
        self == SessionStatus::Running
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Edges: `Pending -> Running`, `Pending -> Cancelled`, and
    /// `Running -> {Completed, Failed, Cancelled}`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Cancelled) | (Running, Completed | Failed | Cancelled)
        )
    }
}

/// Identity and bookkeeping for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Primary key. Unique and never reused.
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub status: SessionStatus,
    /// Set once when the record is created.
    pub start_time: DateTime<Utc>,
    /// Refreshed on every write.
    pub last_update_time: DateTime<Utc>,
    /// Epoch seconds after which the record is logically deleted.
    ///
    /// Only the session store's save path assigns this.
    pub expires_at: i64,
}

impl SessionMetadata {
    /// Metadata for a new running cycle with the given id.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: None,
            guild_id: None,
            channel_id: None,
            status: SessionStatus::Running,
            start_time: now,
            last_update_time: now,
            expires_at: 0,
        }
    }

    /// Metadata for a new running cycle with a freshly generated id.
    pub fn new_cycle() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }
}

/// The full checkpoint of a cycle.
///
/// `theta_state` and `context` are opaque to this layer; their schema
/// belongs to whoever drives the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSessionState {
    #[serde(flatten)]
    pub metadata: SessionMetadata,
    pub theta_state: serde_json::Value,
    #[serde(default)]
    pub context: serde_json::Value,
    /// Last recorded failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PersistedSessionState {
    pub fn new(metadata: SessionMetadata, theta_state: serde_json::Value) -> Self {
        Self {
            metadata,
            theta_state,
            context: serde_json::Value::Null,
            error: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.metadata.status
    }
}

/// Result of restoring a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredSession {
    pub state: PersistedSessionState,
    /// True only while the session is `Running`.
    pub resumable: bool,
    /// Milliseconds since `start_time`.
    pub elapsed_ms: i64,
}

/// A secondary-index partition to query.
///
/// Indexes are declared on `(user_id, status)` and `(guild_id, status)` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    User(String),
    Guild(String),
}

impl IndexKey {
    /// Name of the attribute this index is partitioned on.
    pub fn attribute(&self) -> &'static str {
        match self {
            IndexKey::User(_) => "user_id",
            IndexKey::Guild(_) => "guild_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            IndexKey::User(v) | IndexKey::Guild(v) => v,
        }
    }

    /// Whether the given metadata falls in this partition.
    pub fn matches(&self, metadata: &SessionMetadata) -> bool {
        match self {
            IndexKey::User(v) => metadata.user_id.as_deref() == Some(v.as_str()),
            IndexKey::Guild(v) => metadata.guild_id.as_deref() == Some(v.as_str()),
        }
    }
}

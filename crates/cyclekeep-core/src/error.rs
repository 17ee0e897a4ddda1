// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for cyclekeep.
//!
//! Expected negative outcomes (a missing session, a lost finalization race)
//! are returned as ordinary values by the session store. The variants here
//! cover everything that must reach the caller as a failure.

use thiserror::Error;

use crate::types::SessionStatus;

/// The primary error type used across backend traits and the session store.
#[derive(Debug, Error)]
pub enum CyclekeepError {
    /// Configuration errors (invalid TOML, bad values, missing provisioning).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, malformed item).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A conditional write found the stored status different from the expected one.
    ///
    /// Backends raise this; the session store converts it into `Ok(false)`.
    #[error("precondition failed for session {session_id}: expected status {expected}")]
    PreconditionFailed {
        session_id: String,
        expected: SessionStatus,
    },

    /// The requested status edge is not part of the session state machine.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Caller-supplied input was rejected before any storage access.
    #[error("validation error: {0}")]
    Validation(String),

    /// A caller-imposed deadline elapsed before the backend answered.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CyclekeepError {
    /// Wraps any error as a storage failure.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Every store operation is safe to retry, so this only separates
    /// transport-level trouble from caller mistakes.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Timeout { .. })
    }

    /// A message safe to show to end users. Never includes backend detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Storage { .. } | Self::Timeout { .. } => {
                "session storage is temporarily unavailable, please try again"
            }
            Self::PreconditionFailed { .. } => "the session was already finalized elsewhere",
            Self::InvalidTransition { .. } | Self::Validation(_) => "the request was rejected",
            Self::Config(_) => "the service is misconfigured",
            Self::Internal(_) => "an internal error occurred",
        }
    }
}

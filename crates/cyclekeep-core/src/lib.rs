// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for cyclekeep.
//!
//! Defines the persisted session record, the status state machine, the
//! error type, and the traits a storage backend implements so the session
//! store can checkpoint and resume cycles on top of it.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CyclekeepError;
pub use types::{
    HealthStatus, IndexKey, PersistedSessionState, RestoredSession, SessionMetadata,
    SessionStatus,
};

pub use traits::{PluginAdapter, SessionBackend, expiry_cutoff, is_expired_at};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_timeout_are_transient() {
        let storage = CyclekeepError::storage(std::io::Error::other("throttled"));
        let timeout = CyclekeepError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        let invalid = CyclekeepError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Running,
        };
        assert!(storage.is_transient());
        assert!(timeout.is_transient());
        assert!(!invalid.is_transient());
        assert!(!CyclekeepError::Validation("empty id".into()).is_transient());
    }

    #[test]
    fn user_message_does_not_leak_backend_detail() {
        let err = CyclekeepError::storage(std::io::Error::other(
            "SQLITE_CORRUPT at /var/lib/cyclekeep/cyclekeep.db",
        ));
        assert!(err.to_string().contains("SQLITE_CORRUPT"));
        assert!(!err.user_message().contains("SQLITE"));
        assert!(!err.user_message().contains("/var/lib"));
    }

    #[test]
    fn precondition_error_names_session_and_status() {
        let err = CyclekeepError::PreconditionFailed {
            session_id: "s1".into(),
            expected: SessionStatus::Running,
        };
        let text = err.to_string();
        assert!(text.contains("s1"));
        assert!(text.contains("RUNNING"));
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_session_backend<T: SessionBackend>() {}
    }
}

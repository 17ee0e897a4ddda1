// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for cyclekeep.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level cyclekeep configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CyclekeepConfig {
    /// Process-level settings (logging, call deadlines).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session expiry and sweeping settings.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline applied by the CLI to each store call.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

impl RuntimeConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            op_timeout_secs: default_op_timeout_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_op_timeout_secs() -> u64 {
    10
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Name of the provisioned session table.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            table_name: default_table_name(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("cyclekeep").join("cyclekeep.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("cyclekeep.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Table created by the bundled schema migration.
pub const DEFAULT_TABLE_NAME: &str = "cycle_sessions";

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Session expiry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// TTL applied by `save` when the caller does not pass one.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Interval between expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Also purge expired records in terminal states during each sweep.
    #[serde(default = "default_passive_expiry")]
    pub passive_expiry: bool,
}

impl SessionConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            passive_expiry: default_passive_expiry(),
        }
    }
}

/// One hour.
pub const DEFAULT_TTL_SECS: u64 = 3600;

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_passive_expiry() -> bool {
    true
}

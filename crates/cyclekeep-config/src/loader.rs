// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./cyclekeep.toml` > `~/.config/cyclekeep/cyclekeep.toml`
//! > `/etc/cyclekeep/cyclekeep.toml` with environment variable overrides via
//! the `CYCLEKEEP_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CyclekeepConfig;

const SYSTEM_CONFIG: &str = "/etc/cyclekeep/cyclekeep.toml";
const LOCAL_CONFIG: &str = "cyclekeep.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cyclekeep/cyclekeep.toml` (system-wide)
/// 3. `~/.config/cyclekeep/cyclekeep.toml` (user XDG config)
/// 4. `./cyclekeep.toml` (local directory)
/// 5. `CYCLEKEEP_*` environment variables
pub fn load_config() -> Result<CyclekeepConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CyclekeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CyclekeepConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CyclekeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CyclekeepConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CyclekeepConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|d| d.join("cyclekeep/cyclekeep.toml"))
        .unwrap_or_default()
}

pub(crate) fn system_config_path() -> &'static Path {
    Path::new(SYSTEM_CONFIG)
}

pub(crate) fn local_config_path() -> &'static Path {
    Path::new(LOCAL_CONFIG)
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `CYCLEKEEP_STORAGE_TABLE_NAME` must map to
/// `storage.table_name`, not `storage.table.name`.
fn env_provider() -> Env {
    Env::prefixed("CYCLEKEEP_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("runtime_", "runtime.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("session_", "session.", 1);
        mapped.into()
    })
}

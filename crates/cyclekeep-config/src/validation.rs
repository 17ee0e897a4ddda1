// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::CyclekeepConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &CyclekeepConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut reject = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.runtime.log_level.as_str()) {
        reject(format!(
            "runtime.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.runtime.log_level
        ));
    }

    if config.runtime.op_timeout_secs == 0 {
        reject("runtime.op_timeout_secs must be at least 1".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        reject("storage.database_path must not be empty".to_string());
    }

    if !is_plain_identifier(&config.storage.table_name) {
        reject(format!(
            "storage.table_name `{}` must match [A-Za-z_][A-Za-z0-9_]*",
            config.storage.table_name
        ));
    }

    if config.session.sweep_interval_secs == 0 {
        reject("session.sweep_interval_secs must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Whether `name` can be spliced into SQL as a bare table identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &CyclekeepConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CyclekeepConfig::default()).is_ok());
    }

    #[test]
    fn table_name_with_sql_is_rejected() {
        let mut config = CyclekeepConfig::default();
        config.storage.table_name = "sessions; DROP TABLE x".to_string();
        assert!(messages(&config)[0].contains("storage.table_name"));
    }

    #[test]
    fn identifiers() {
        assert!(is_plain_identifier("cycle_sessions"));
        assert!(is_plain_identifier("_t1"));
        assert!(!is_plain_identifier("1table"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("a-b"));
    }

    #[test]
    fn all_violations_are_collected() {
        let mut config = CyclekeepConfig::default();
        config.runtime.log_level = "loud".to_string();
        config.storage.database_path = " ".to_string();
        config.session.sweep_interval_secs = 0;
        let found = messages(&config);
        assert_eq!(found.len(), 3, "got: {found:?}");
        assert!(found.iter().any(|m| m.contains("log_level")));
        assert!(found.iter().any(|m| m.contains("database_path")));
        assert!(found.iter().any(|m| m.contains("sweep_interval_secs")));
    }
}

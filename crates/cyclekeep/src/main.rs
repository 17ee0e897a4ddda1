// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! cyclekeep - session checkpointing and resumption for long-running agent cycles.
//!
//! This is the composition root: it loads configuration, builds the one
//! SQLite backend for the process, and dispatches to a command.

mod commands;
mod serve;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{ArgGroup, Parser, Subcommand};
use cyclekeep_config::CyclekeepConfig;
use cyclekeep_core::{CyclekeepError, SessionBackend, SessionStatus};
use cyclekeep_session::{PendingFilter, ResumptionPolicy, SessionStore};
use cyclekeep_storage::SqliteBackend;
use tracing::{debug, error};

/// cyclekeep - session checkpointing and resumption for long-running agent cycles.
#[derive(Parser, Debug)]
#[command(name = "cyclekeep", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the expiry sweeper until interrupted.
    Sweep,
    /// Delete expired running sessions once and print the count.
    Cleanup,
    /// Restore one session and print it.
    Show {
        session_id: String,
    },
    /// List sessions for a user or guild.
    #[command(group(ArgGroup::new("scope").required(true).multiple(true).args(["user", "guild"])))]
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        guild: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        /// Defaults to RUNNING.
        #[arg(long, value_parser = parse_status)]
        status: Option<SessionStatus>,
    },
    /// Delete one session.
    Delete {
        session_id: String,
    },
    /// Overwrite a session's status, or transition it conditionally with --expect.
    SetStatus {
        session_id: String,
        #[arg(value_parser = parse_status)]
        status: SessionStatus,
        /// Only apply if the stored status is this one.
        #[arg(long, value_parser = parse_status)]
        expect: Option<SessionStatus>,
    },
    /// Check that the backend is reachable and provisioned.
    Health,
}

/// Accepts statuses in any case (`running`, `RUNNING`).
fn parse_status(raw: &str) -> Result<SessionStatus, String> {
    SessionStatus::from_str(&raw.to_ascii_uppercase()).map_err(|_| {
        let valid: Vec<String> = SessionStatus::ALL.iter().map(|s| s.to_string()).collect();
        format!("unknown status `{raw}` (expected one of: {})", valid.join(", "))
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => cyclekeep_config::load_and_validate_path(path),
        None => cyclekeep_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            cyclekeep_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.runtime.log_level);

    if let Err(e) = run(cli.command, &config).await {
        error!(error = %e, "command failed");
        eprintln!("cyclekeep: {}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &CyclekeepConfig) -> Result<(), CyclekeepError> {
    let deadline = config.runtime.op_timeout();

    let backend = Arc::new(SqliteBackend::new(config.storage.clone()));
    commands::with_deadline(deadline, backend.initialize()).await?;
    let store = Arc::new(SessionStore::new(
        backend,
        ResumptionPolicy::from_config(&config.session),
    ));
    debug!(table = %config.storage.table_name, "session store ready");

    let output = match command {
        Commands::Sweep => {
            let cancel = serve::install_signal_handler();
            let completed = serve::run_sweep(store, &config.session, cancel).await?;
            return print_json(&serde_json::json!({ "sweeps": completed }));
        }
        Commands::Cleanup => commands::with_deadline(deadline, commands::cleanup(&store)).await?,
        Commands::Show { session_id } => {
            commands::with_deadline(deadline, commands::show(&store, &session_id)).await?
        }
        Commands::List {
            user,
            guild,
            channel,
            status,
        } => {
            let filter = PendingFilter {
                user_id: user,
                guild_id: guild,
                channel_id: channel,
                status,
            };
            commands::with_deadline(deadline, commands::list(&store, &filter)).await?
        }
        Commands::Delete { session_id } => {
            commands::with_deadline(deadline, commands::delete(&store, &session_id)).await?
        }
        Commands::SetStatus {
            session_id,
            status,
            expect,
        } => {
            commands::with_deadline(
                deadline,
                commands::set_status(&store, &session_id, status, expect),
            )
            .await?
        }
        Commands::Health => commands::with_deadline(deadline, commands::health(&store)).await?,
    };

    store.close().await?;
    print_json(&output)
}

fn print_json(value: &serde_json::Value) -> Result<(), CyclekeepError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CyclekeepError::Internal(e.to_string()))?;
    println!("{text}");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cyclekeep={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_requires_a_scope() {
        assert!(Cli::try_parse_from(["cyclekeep", "list"]).is_err());
        assert!(Cli::try_parse_from(["cyclekeep", "list", "--channel", "c1"]).is_err());

        let cli = Cli::try_parse_from(["cyclekeep", "list", "--user", "u1", "--guild", "g1"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::List { user: Some(_), guild: Some(_), .. }
        ));
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        let cli = Cli::try_parse_from([
            "cyclekeep",
            "set-status",
            "s1",
            "completed",
            "--expect",
            "RUNNING",
        ])
        .unwrap();
        match cli.command {
            Commands::SetStatus {
                session_id,
                status,
                expect,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(status, SessionStatus::Completed);
                assert_eq!(expect, Some(SessionStatus::Running));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = parse_status("paused").unwrap_err();
        assert!(err.contains("PENDING"));
        assert!(Cli::try_parse_from(["cyclekeep", "set-status", "s1", "paused"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["cyclekeep", "health", "--config", "/tmp/cyclekeep.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/cyclekeep.toml")));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = cyclekeep_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.storage.table_name, "cycle_sessions");
        assert_eq!(config.session.default_ttl_secs, 3600);
    }
}

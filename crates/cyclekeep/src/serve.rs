// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cyclekeep sweep` command implementation.
//!
//! Runs the expiry sweeper until SIGTERM or SIGINT, then checkpoints and
//! closes the backend.

use std::sync::Arc;

use cyclekeep_config::model::SessionConfig;
use cyclekeep_core::CyclekeepError;
use cyclekeep_session::{SessionStore, Sweeper};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, waiting on Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Run the sweeper until `cancel` fires, then close the store.
pub async fn run_sweep(
    store: Arc<SessionStore>,
    config: &SessionConfig,
    cancel: CancellationToken,
) -> Result<u64, CyclekeepError> {
    let sweeper = Sweeper::from_config(store.clone(), config);
    let completed = sweeper
        .spawn(cancel)
        .await
        .map_err(|e| CyclekeepError::Internal(format!("sweeper task failed: {e}")))?;

    store.close().await?;
    info!(completed, "sweep daemon stopped");
    Ok(completed)
}

// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background expiry sweep.
//!
//! Runs [`SessionStore::cleanup_expired_sessions`] on a fixed interval and,
//! with passive expiry enabled, asks the backend to purge every expired
//! record. A failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use cyclekeep_config::model::SessionConfig;
use cyclekeep_core::CyclekeepError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::SessionStore;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired `RUNNING` sessions deleted by the scan.
    pub cleaned: u64,
    /// Records of any status removed by the backend purge.
    pub purged: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.cleaned + self.purged
    }
}

pub struct Sweeper {
    store: Arc<SessionStore>,
    interval: Duration,
    passive_expiry: bool,
}

impl Sweeper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            passive_expiry: true,
        }
    }

    pub fn from_config(store: Arc<SessionStore>, config: &SessionConfig) -> Self {
        Self::new(store, config.sweep_interval()).with_passive_expiry(config.passive_expiry)
    }

    pub fn with_passive_expiry(mut self, enabled: bool) -> Self {
        self.passive_expiry = enabled;
        self
    }

    /// Run one sweep now.
    pub async fn sweep_once(&self) -> Result<SweepReport, CyclekeepError> {
        let cleaned = self.store.cleanup_expired_sessions().await?;
        let purged = if self.passive_expiry {
            self.store.purge_expired().await?
        } else {
            0
        };
        Ok(SweepReport { cleaned, purged })
    }

    /// Sweep on every tick until `cancel` fires. Returns the number of
    /// sweeps that completed successfully.
    ///
    /// The first sweep runs immediately.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0u64;

        info!(
            interval_secs = self.interval.as_secs(),
            passive_expiry = self.passive_expiry,
            "session sweeper started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(completed, "session sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.total() > 0 => {
                            completed += 1;
                            info!(
                                cleaned = report.cleaned,
                                purged = report.purged,
                                "session sweep removed expired sessions"
                            );
                        }
                        Ok(_) => {
                            completed += 1;
                            debug!("session sweep found nothing to remove");
                        }
                        Err(e) => {
                            warn!(error = %e, "session sweep failed (will retry next tick)");
                        }
                    }
                }
            }
        }

        completed
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(cancel))
    }
}

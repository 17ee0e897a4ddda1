// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session persistence and resumption for long-running cycles.
//!
//! [`SessionStore`] checkpoints a cycle's progress through an injected
//! [`SessionBackend`](cyclekeep_core::SessionBackend) so that a restarted
//! process can pick it up again. [`ResumptionPolicy`] decides what may be
//! resumed and when records expire; [`Sweeper`] reclaims abandoned work in
//! the background.

pub mod policy;
pub mod store;
pub mod sweeper;

pub use policy::{Resumability, ResumptionPolicy};
pub use store::{PendingFilter, SaveOptions, SessionStore};
pub use sweeper::{SweepReport, Sweeper};

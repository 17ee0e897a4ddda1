// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite session backend for cyclekeep.
//!
//! Provides WAL-mode SQLite storage with an embedded schema migration, a
//! single-writer concurrency model via `tokio-rusqlite`, and the keyed,
//! conditional and indexed operations the session store relies on.
//!
//! All statements run on one background thread owned by [`Database`].
//! Conditional status updates are single `UPDATE ... WHERE status = ?`
//! statements, which is what makes them safe against concurrent writers.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteBackend;
pub use database::Database;

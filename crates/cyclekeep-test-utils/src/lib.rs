// SPDX-FileCopyrightText: 2026 Cyclekeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for cyclekeep integration tests.
//!
//! Provides backends and harness infrastructure for fast, deterministic,
//! CI-runnable tests.
//!
//! # Components
//!
//! - [`MemoryBackend`] - In-process backend with atomic conditional updates
//! - [`FailingBackend`] - Backend whose every operation fails with a storage error
//! - [`TestHarness`] - Initialized backend over a temp SQLite file or memory

pub mod failing_backend;
pub mod harness;
pub mod memory_backend;

pub use failing_backend::FailingBackend;
pub use harness::{HarnessBackend, TestHarness};
pub use memory_backend::MemoryBackend;

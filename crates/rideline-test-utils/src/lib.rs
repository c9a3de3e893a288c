// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Rideline integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockJobStore`] - In-memory job and profile store with fault injection
//! - [`MockIdentity`] - Identity provider driven by sign-in/sign-out calls
//! - [`TestHarness`] - Store, config and session wiring with wait helpers

pub mod fixtures;
pub mod harness;
pub mod mock_identity;
pub mod mock_store;

pub use harness::TestHarness;
pub use mock_identity::MockIdentity;
pub use mock_store::MockJobStore;

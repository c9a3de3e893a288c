// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Rideline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, conditional job writes guarded by
//! status and the single-active-job index, atomic lazy profile creation, and
//! change feeds tailed from a persistent change log.

pub mod adapter;
pub mod database;
mod feed;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
pub use models::ChangeRecord;

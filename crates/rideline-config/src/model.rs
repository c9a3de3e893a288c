// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Rideline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Rideline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RidelineConfig {
    /// Process-wide behavior (logging).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// How jobs reach a driver's pool.
    #[serde(default)]
    pub assignment: AssignmentConfig,

    /// Driver view limits.
    #[serde(default)]
    pub view: ViewConfig,

    /// Change-feed resubscription backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Conditional write retry policy.
    #[serde(default)]
    pub writes: WriteConfig,

    /// Per-driver session channel sizing.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Process-wide configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How often a change feed polls the change log for writes made by
    /// other processes.
    #[serde(default = "default_feed_poll_interval_ms")]
    pub feed_poll_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            feed_poll_interval_ms: default_feed_poll_interval_ms(),
        }
    }
}

impl StorageConfig {
    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed_poll_interval_ms)
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("rideline").join("rideline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("rideline.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_feed_poll_interval_ms() -> u64 {
    250
}

/// Assignment policy for pending jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Drivers pull from the shared pool of unassigned jobs; rejecting a
    /// job only hides it from the rejecting driver.
    #[default]
    Pull,
    /// A dispatcher pre-assigns each job to one driver; rejecting it is terminal.
    PreAssigned,
}

impl std::fmt::Display for AssignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentMode::Pull => f.write_str("pull"),
            AssignmentMode::PreAssigned => f.write_str("pre_assigned"),
        }
    }
}

/// Assignment configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    #[serde(default)]
    pub mode: AssignmentMode,
}

/// Driver view configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    /// Maximum number of jobs shown in the pending pool.
    #[serde(default = "default_pool_limit")]
    pub pool_limit: usize,

    /// Maximum number of jobs kept in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            pool_limit: default_pool_limit(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_pool_limit() -> usize {
    20
}

fn default_history_limit() -> usize {
    50
}

/// Resubscription backoff after a change-feed error.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Bounded retry of conditional writes on transport failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WriteConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

/// Per-driver session channel capacities.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Capacity of the ordered inbound queue feeding the engine.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the lifecycle event broadcast.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_event_capacity() -> usize {
    128
}

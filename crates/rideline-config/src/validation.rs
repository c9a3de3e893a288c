// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, positive limits and ordered backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::RidelineConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RidelineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Plain level names are checked; full EnvFilter directives are passed through.
    let level = config.agent.log_level.trim();
    if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level `{level}` is not one of {}",
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.storage.feed_poll_interval_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "storage.feed_poll_interval_ms must be positive".to_string(),
        });
    }

    for (key, value) in [
        ("view.pool_limit", config.view.pool_limit),
        ("view.history_limit", config.view.history_limit),
        ("session.queue_capacity", config.session.queue_capacity),
        ("session.event_capacity", config.session.event_capacity),
    ] {
        if value < 1 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be at least 1, got {value}"),
            });
        }
    }

    if config.reconnect.initial_backoff_ms > config.reconnect.max_backoff_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.initial_backoff_ms ({}) must not exceed reconnect.max_backoff_ms ({})",
                config.reconnect.initial_backoff_ms, config.reconnect.max_backoff_ms
            ),
        });
    }

    if config.writes.max_attempts < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "writes.max_attempts must be at least 1, got {}",
                config.writes.max_attempts
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./rideline.toml` > `~/.config/rideline/rideline.toml` > `/etc/rideline/rideline.toml`
//! with environment variable overrides via `RIDELINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RidelineConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/rideline/rideline.toml";

/// Local configuration file, relative to the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rideline.toml";

/// Top-level sections addressable through `RIDELINE_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &[
    "agent",
    "storage",
    "assignment",
    "view",
    "reconnect",
    "writes",
    "session",
];

/// Per-user configuration file under the XDG config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rideline").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/rideline/rideline.toml` (system-wide)
/// 3. `~/.config/rideline/rideline.toml` (user XDG config)
/// 4. `./rideline.toml` (local directory)
/// 5. `RIDELINE_*` environment variables
pub fn load_config() -> Result<RidelineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RidelineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RidelineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RidelineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RidelineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RidelineConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `RIDELINE_VIEW_POOL_LIMIT` must map to `view.pool_limit`, not
/// `view.pool.limit`.
fn env_provider() -> Env {
    Env::prefixed("RIDELINE_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

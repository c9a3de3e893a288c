// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rideline profile` command implementation.

use rideline_config::RidelineConfig;
use rideline_core::{Identity, ProfilePatch, RidelineError};

use crate::jobs::open_gateway;

/// Show the driver's profile, creating it on first use, after applying
/// `patch` when it sets anything.
pub async fn run_profile(
    config: &RidelineConfig,
    driver: &str,
    patch: &ProfilePatch,
) -> Result<(), RidelineError> {
    let gateway = open_gateway(config).await?;
    let mut profile = gateway.create_profile(&Identity::new(driver)).await?;
    if *patch != ProfilePatch::default() {
        profile = gateway.update_profile(&profile.id, patch).await?;
    }
    let rendered = serde_json::to_string_pretty(&profile)
        .map_err(|e| RidelineError::Internal(format!("failed to render profile: {e}")))?;
    println!("{rendered}");
    Ok(())
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile store trait for the `driverProfiles` collection.

use async_trait::async_trait;

use crate::error::RidelineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DriverId, DriverProfile, Identity, ProfilePatch};

/// Backend holding driver profiles. Profiles are never deleted.
#[async_trait]
pub trait ProfileStore: PluginAdapter {
    /// Return the driver's profile, creating it from `identity` if absent.
    ///
    /// Must be a single atomic create-if-absent: concurrent first logins of
    /// the same driver all observe the same profile.
    async fn get_or_create_profile(
        &self,
        identity: &Identity,
    ) -> Result<DriverProfile, RidelineError>;

    async fn get_profile(&self, id: &DriverId) -> Result<Option<DriverProfile>, RidelineError>;

    /// Apply a settings update and stamp `last_updated_at`.
    async fn update_profile(
        &self,
        id: &DriverId,
        patch: &ProfilePatch,
    ) -> Result<DriverProfile, RidelineError>;
}

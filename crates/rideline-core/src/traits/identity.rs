// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity provider trait.

use tokio::sync::watch;

use crate::traits::adapter::PluginAdapter;
use crate::types::Identity;

/// Supplies the authenticated driver, if any.
///
/// Credential issuance lives outside this system; implementations only
/// report who is signed in and when that changes.
pub trait IdentityProvider: PluginAdapter {
    /// The currently signed-in driver, or `None` when signed out.
    fn current(&self) -> Option<Identity>;

    /// A receiver that observes every sign-in, sign-out and identity switch.
    fn watch(&self) -> watch::Receiver<Option<Identity>>;
}

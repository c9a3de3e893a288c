// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock identity provider whose signed-in driver is set by the test.

use async_trait::async_trait;
use tokio::sync::watch;

use rideline_core::{AdapterType, HealthStatus, Identity, IdentityProvider, PluginAdapter, RidelineError};

pub struct MockIdentity {
    current: watch::Sender<Option<Identity>>,
}

impl MockIdentity {
    /// Start signed out.
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn signed_in(identity: Identity) -> Self {
        let (current, _) = watch::channel(Some(identity));
        Self { current }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.current.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.current.send_replace(None);
    }
}

impl Default for MockIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockIdentity {
    fn name(&self) -> &str {
        "mock-identity"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Identity
    }

    async fn health_check(&self) -> Result<HealthStatus, RidelineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RidelineError> {
        Ok(())
    }
}

impl IdentityProvider for MockIdentity {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_out_are_observed() {
        let provider = MockIdentity::new();
        let mut rx = provider.watch();
        assert!(provider.current().is_none());

        provider.sign_in(Identity::new("d-1"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|i| i.driver_id.as_str()),
            Some("d-1")
        );

        provider.sign_out();
        assert!(provider.current().is_none());
    }
}

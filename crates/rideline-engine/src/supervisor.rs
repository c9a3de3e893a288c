// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity-driven session lifecycle.
//!
//! The supervisor follows the identity provider: it starts a driver session
//! on sign-in, tears it down on sign-out, and replaces it when a different
//! driver signs in. The controller of the current session is published on a
//! watch channel.

use std::sync::Arc;
use std::time::Duration;

use rideline_config::RidelineConfig;
use rideline_core::{Identity, IdentityProvider, RidelineError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::controller::LifecycleController;
use crate::gateway::JobGateway;
use crate::session::DriverSession;
use crate::shutdown::drain_session;

/// Upper bound on waiting for a torn-down session's tasks.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum Started {
    Session(DriverSession),
    /// The identity changed while starting; re-evaluate.
    Superseded,
    Cancelled,
}

pub struct SessionSupervisor {
    gateway: JobGateway,
    identity: Arc<dyn IdentityProvider + Send + Sync>,
    config: RidelineConfig,
    current: watch::Sender<Option<LifecycleController>>,
}

impl SessionSupervisor {
    pub fn new(
        gateway: JobGateway,
        identity: Arc<dyn IdentityProvider + Send + Sync>,
        config: RidelineConfig,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            gateway,
            identity,
            config,
            current,
        }
    }

    /// Receiver for the current session's controller, `None` while signed out.
    pub fn controllers(&self) -> watch::Receiver<Option<LifecycleController>> {
        self.current.subscribe()
    }

    /// Follow the identity provider until `cancel` fires or the provider closes.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RidelineError> {
        let mut identities = self.identity.watch();
        let mut session: Option<DriverSession> = None;
        info!(provider = self.identity.name(), "session supervisor running");

        loop {
            let wanted = identities.borrow_and_update().clone();
            let running = session.as_ref().map(|s| s.driver().clone());

            if running.as_ref() != wanted.as_ref().map(|i| &i.driver_id) {
                if let Some(old) = session.take() {
                    info!(driver_id = %old.driver(), "driver signed out or switched");
                    self.current.send_replace(None);
                    drain_session(old, DRAIN_TIMEOUT).await;
                }
                if let Some(identity) = wanted {
                    match self.start(&identity, &mut identities, &cancel).await {
                        Started::Session(started) => {
                            self.current.send_replace(Some(started.controller()));
                            session = Some(started);
                        }
                        Started::Superseded => continue,
                        Started::Cancelled => break,
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = identities.changed() => {
                    if changed.is_err() {
                        info!("identity provider closed");
                        break;
                    }
                }
            }
        }

        if let Some(last) = session.take() {
            self.current.send_replace(None);
            drain_session(last, DRAIN_TIMEOUT).await;
        }
        info!("session supervisor stopped");
        Ok(())
    }

    /// Start a session, retrying with backoff while the identity is unchanged.
    async fn start(
        &self,
        identity: &Identity,
        identities: &mut watch::Receiver<Option<Identity>>,
        cancel: &CancellationToken,
    ) -> Started {
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.reconnect.initial_backoff_ms),
            Duration::from_millis(self.config.reconnect.max_backoff_ms),
        );
        loop {
            let started = tokio::select! {
                _ = cancel.cancelled() => return Started::Cancelled,
                started = DriverSession::start(self.gateway.clone(), identity, &self.config) => started,
            };
            let err = match started {
                Ok(session) => return Started::Session(session),
                Err(err) => err,
            };
            let delay = backoff.next_delay();
            warn!(
                driver_id = %identity.driver_id,
                error = %err,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "failed to start driver session"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Started::Cancelled,
                changed = identities.changed() => {
                    return if changed.is_err() { Started::Cancelled } else { Started::Superseded };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

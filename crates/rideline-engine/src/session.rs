// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-driver session: subscription pumps, the engine task and its channels.
//!
//! A session goes through states: Syncing -> Live -> Closed. It is Syncing
//! until every stream has delivered its first snapshot, and Closed once torn
//! down. Connectivity is tracked separately and may degrade and recover any
//! number of times while the session is Live.

use std::collections::BTreeSet;
use std::sync::Arc;

use rideline_config::RidelineConfig;
use rideline_core::{DriverId, Identity, RidelineError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::LifecycleController;
use crate::events::{Connectivity, DriverEvent};
use crate::gateway::JobGateway;
use crate::reconcile::{Merge, ReconcileSettings, Reconciler, StreamKind};
use crate::recording;
use crate::subscription::{Inbound, PumpSettings, spawn_pumps};
use crate::view::DriverView;

/// States in the session FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Streams are delivering their initial snapshots.
    Syncing,
    /// Every stream has synced at least once.
    Live,
    /// Torn down; write results are no longer applied.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Syncing => write!(f, "syncing"),
            SessionState::Live => write!(f, "live"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// A running session for one signed-in driver.
///
/// Constructed on login and torn down on logout. Dropping the session
/// cancels its tasks; [`shutdown`](Self::shutdown) also waits for them.
pub struct DriverSession {
    driver: DriverId,
    controller: LifecycleController,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DriverSession {
    /// Load (or lazily create) the driver's profile, subscribe to every
    /// stream and start the engine.
    pub async fn start(
        gateway: JobGateway,
        identity: &Identity,
        config: &RidelineConfig,
    ) -> Result<Self, RidelineError> {
        let profile = gateway.create_profile(identity).await?;
        let driver = profile.id.clone();
        info!(
            driver_id = %driver,
            mode = %config.assignment.mode,
            "driver session starting"
        );

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(config.session.queue_capacity.max(1));
        let reconciler = Reconciler::new(driver.clone(), ReconcileSettings::from_config(config));
        let (view_tx, view_rx) = watch::channel(reconciler.view());
        let (connectivity_tx, connectivity_rx) = watch::channel(Connectivity::Online);
        let (state_tx, state_rx) = watch::channel(SessionState::Syncing);
        let (events_tx, _) = broadcast::channel(config.session.event_capacity.max(1));

        let settings = PumpSettings {
            gateway: gateway.clone(),
            driver: driver.clone(),
            mode: config.assignment.mode,
            view: config.view.clone(),
            reconnect: config.reconnect.clone(),
        };
        let mut tasks = spawn_pumps(&settings, &tx, &cancel);

        let engine = Engine {
            reconciler,
            rx,
            view_tx,
            connectivity_tx,
            state_tx,
            events: events_tx.clone(),
            degraded: BTreeSet::new(),
            cancel: cancel.clone(),
        };
        tasks.push(tokio::spawn(engine.run()));

        let controller = LifecycleController::new(
            driver.clone(),
            config.assignment.mode,
            config.writes.clone(),
            gateway,
            profile,
            view_rx,
            connectivity_rx,
            state_rx,
            events_tx,
            tx,
            cancel.clone(),
        );

        Ok(Self {
            driver,
            controller,
            cancel,
            tasks,
        })
    }

    pub fn driver(&self) -> &DriverId {
        &self.driver
    }

    /// A handle for lifecycle operations and view access.
    pub fn controller(&self) -> LifecycleController {
        self.controller.clone()
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    /// Wait until every stream has delivered its initial snapshot.
    pub async fn wait_until_synced(&self) -> Result<(), RidelineError> {
        self.controller.wait_until_synced().await
    }

    /// Unsubscribe every stream, stop the engine and wait for the tasks.
    ///
    /// Writes still in flight complete against the store, but their results
    /// are not applied to the discarded view.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await
                && e.is_panic()
            {
                warn!(driver_id = %self.driver, error = %e, "session task panicked");
            }
        }
        info!(driver_id = %self.driver, "driver session closed");
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The single consumer of a session's inbound queue.
struct Engine {
    reconciler: Reconciler,
    rx: mpsc::Receiver<Inbound>,
    view_tx: watch::Sender<Arc<DriverView>>,
    connectivity_tx: watch::Sender<Connectivity>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<DriverEvent>,
    degraded: BTreeSet<StreamKind>,
    cancel: CancellationToken,
}

impl Engine {
    async fn run(mut self) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                msg = self.rx.recv() => msg,
            };
            let Some(msg) = msg else {
                break;
            };
            self.handle(msg);
        }
        self.rx.close();
        self.state_tx.send_replace(SessionState::Closed);
        debug!(driver_id = %self.reconciler.driver(), "engine stopped");
    }

    fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::Feed { stream, item } => {
                recording::record_feed_event(stream);
                let is_snapshot = matches!(item, rideline_core::FeedItem::Snapshot(_));
                let merge = self.reconciler.apply_feed(stream, item);
                self.publish(merge);
                if is_snapshot && self.degraded.remove(&stream) {
                    self.connectivity_changed();
                }
                let syncing = *self.state_tx.borrow() == SessionState::Syncing;
                if syncing && self.reconciler.is_synced() {
                    self.state_tx.send_replace(SessionState::Live);
                    info!(driver_id = %self.reconciler.driver(), "driver session live");
                }
            }
            Inbound::StreamFailed { stream, error } => {
                debug!(driver_id = %self.reconciler.driver(), stream = %stream, error = %error, "stream degraded");
                if self.degraded.insert(stream) {
                    self.connectivity_changed();
                }
            }
            Inbound::Optimistic { job, applied } => {
                if self.cancel.is_cancelled() {
                    return;
                }
                let merge = self.reconciler.apply_optimistic(job);
                self.publish(merge);
                let _ = applied.send(());
            }
        }
    }

    /// Publish the view before the events so event handlers read the new state.
    fn publish(&mut self, merge: Merge) {
        if let Some(view) = merge.view {
            recording::set_view_sizes(view.pool.len(), view.history.len());
            self.view_tx.send_replace(view);
        }
        for event in merge.events {
            if matches!(event, DriverEvent::DataInconsistency { .. }) {
                recording::record_data_inconsistency();
            }
            debug!(driver_id = %self.reconciler.driver(), event = event.name(), "driver event");
            // No receivers is fine.
            let _ = self.events.send(event);
        }
    }

    fn connectivity_changed(&mut self) {
        let connectivity = if self.degraded.is_empty() {
            info!(driver_id = %self.reconciler.driver(), "connectivity restored");
            Connectivity::Online
        } else {
            let streams: Vec<StreamKind> = self.degraded.iter().copied().collect();
            warn!(driver_id = %self.reconciler.driver(), streams = ?streams, "connectivity degraded");
            Connectivity::Degraded { streams }
        };
        self.connectivity_tx.send_replace(connectivity.clone());
        let _ = self
            .events
            .send(DriverEvent::ConnectivityChanged(connectivity));
    }
}

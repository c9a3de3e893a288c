// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation engine and driver sessions for Rideline.
//!
//! A [`DriverSession`] owns everything that runs for one signed-in driver:
//! - one subscription pump per change feed (pool, active, history, rejected)
//! - the engine task that merges feed items and write results into a
//!   [`DriverView`] and emits [`DriverEvent`]s
//! - a [`LifecycleController`] that validates intents against the view and
//!   performs conditional writes
//!
//! The [`SessionSupervisor`] starts and tears sessions down as the identity
//! provider reports sign-in, sign-out and identity switches.

pub mod backoff;
pub mod controller;
pub mod events;
pub mod gateway;
pub mod reconcile;
pub mod recording;
pub mod session;
pub mod shutdown;
mod subscription;
pub mod supervisor;
pub mod view;

pub use controller::{LifecycleController, TransitionOutcome};
pub use events::{Connectivity, DriverEvent};
pub use gateway::{JobGateway, stream_filter};
pub use reconcile::{Merge, ReconcileSettings, Reconciler, StreamKind};
pub use session::{DriverSession, SessionState};
pub use shutdown::{drain_session, install_signal_handler};
pub use supervisor::SessionSupervisor;
pub use view::{DriverView, Section};

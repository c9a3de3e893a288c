// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed lifecycle events emitted by a driver session.

use rideline_core::{Job, JobId};

use crate::reconcile::StreamKind;

/// Health of a session's change feeds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Online,
    /// The listed streams failed and have not delivered a fresh snapshot yet.
    /// The view keeps serving the last known state meanwhile.
    Degraded { streams: Vec<StreamKind> },
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Degraded { streams } => {
                let names: Vec<&str> = streams.iter().map(|s| s.as_str()).collect();
                write!(f, "degraded ({})", names.join(", "))
            }
        }
    }
}

/// What changed in a driver's view, for presentation code to map onto
/// screen transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A job became the driver's active job.
    BecameActive(Job),
    /// The active job moved between `accepted` and `in_progress`.
    ActiveStatusChanged(Job),
    /// The active slot emptied.
    ActiveCleared { job_id: JobId },
    /// A job the driver was working or offered finished.
    Completed(Job),
    Cancelled(Job),
    Rejected(Job),
    PoolUpdated { size: usize },
    HistoryUpdated { size: usize },
    ConnectivityChanged(Connectivity),
    /// More than one active job was observed; `kept` is shown as active.
    DataInconsistency { kept: JobId, ignored: Vec<JobId> },
}

impl DriverEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            DriverEvent::BecameActive(_) => "became_active",
            DriverEvent::ActiveStatusChanged(_) => "active_status_changed",
            DriverEvent::ActiveCleared { .. } => "active_cleared",
            DriverEvent::Completed(_) => "completed",
            DriverEvent::Cancelled(_) => "cancelled",
            DriverEvent::Rejected(_) => "rejected",
            DriverEvent::PoolUpdated { .. } => "pool_updated",
            DriverEvent::HistoryUpdated { .. } => "history_updated",
            DriverEvent::ConnectivityChanged(_) => "connectivity_changed",
            DriverEvent::DataInconsistency { .. } => "data_inconsistency",
        }
    }
}

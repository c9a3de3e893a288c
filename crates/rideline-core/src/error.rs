// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Rideline job lifecycle system.

use thiserror::Error;

use crate::types::{Job, JobId, JobStatus};

/// Why a locally checked or store-checked guard refused a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The driver already holds a different accepted/in-progress job.
    AlreadyHasActiveJob { active: JobId },
    /// The job is not the caller's current active job.
    NotActiveJob,
    /// The job is not in a status the transition can start from.
    WrongStatus { actual: JobStatus },
    /// The caller is not the job's assigned driver.
    NotAssignedDriver,
    /// The job is already bound to another driver.
    OwnedByAnotherDriver,
    /// The job is not offered to this driver.
    NotInPool,
    /// The caller is not the job's requester.
    NotRequester,
    /// No driver profile is loaded for the session.
    NoProfile,
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precondition::AlreadyHasActiveJob { active } => {
                write!(f, "driver already has active job {active}")
            }
            Precondition::NotActiveJob => write!(f, "job is not the driver's active job"),
            Precondition::WrongStatus { actual } => write!(f, "job is {actual}"),
            Precondition::NotAssignedDriver => write!(f, "caller is not the assigned driver"),
            Precondition::OwnedByAnotherDriver => write!(f, "job belongs to another driver"),
            Precondition::NotInPool => write!(f, "job is not offered to this driver"),
            Precondition::NotRequester => write!(f, "caller is not the requester"),
            Precondition::NoProfile => write!(f, "driver profile is not loaded"),
        }
    }
}

/// The primary error type used across stores, the engine and the controller.
#[derive(Debug, Error)]
pub enum RidelineError {
    /// Configuration errors (invalid TOML, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A guard refused the intent before (or instead of) applying it. Not retried.
    #[error("precondition failed for job {job_id}: {reason}")]
    PreconditionFailed { job_id: JobId, reason: Precondition },

    /// The store refused a conditional write because the job's status moved.
    ///
    /// `current` is the record as the store saw it when refusing the write.
    #[error("job {job_id} is no longer available (expected {expected}, found {})", .current.status)]
    Conflict {
        job_id: JobId,
        expected: JobStatus,
        current: Box<Job>,
    },

    /// A job or profile does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The store or change feed could not be reached.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database, migrations, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Locally observed state violates a store invariant.
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    /// The driver session was torn down.
    #[error("driver session closed")]
    SessionClosed,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RidelineError {
    /// Shorthand for a transport failure without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        RidelineError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a precondition failure.
    pub fn precondition(job_id: &JobId, reason: Precondition) -> Self {
        RidelineError::PreconditionFailed {
            job_id: job_id.clone(),
            reason,
        }
    }

    /// Only transport failures are worth retrying; everything else is a decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RidelineError::Transport { .. })
    }
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle transitions and their guards.
//!
//! [`Transition::apply`] is the only place a job's status changes. Stores
//! call it inside their atomic conditional write, after checking the
//! expected status, so every backend enforces identical rules.

use chrono::{DateTime, Utc};

use crate::error::{Precondition, RidelineError};
use crate::types::{Actor, Decline, DriverId, DriverSnapshot, Job, JobStatus};

/// A requested lifecycle change (the "patch" of a conditional write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Bind a pending job to a driver.
    Accept {
        driver: DriverId,
        snapshot: DriverSnapshot,
    },
    /// Driver-scoped rejection: the job stays pending for other drivers.
    Decline { driver: DriverId },
    /// Terminal rejection of a job pre-assigned to the driver.
    Reject { driver: DriverId },
    Start { driver: DriverId },
    Complete { driver: DriverId },
    Cancel { by: Actor },
}

impl Transition {
    /// Short name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Accept { .. } => "accept",
            Transition::Decline { .. } => "decline",
            Transition::Reject { .. } => "reject",
            Transition::Start { .. } => "start",
            Transition::Complete { .. } => "complete",
            Transition::Cancel { .. } => "cancel",
        }
    }

    /// Status the job ends in once the transition is applied.
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Accept { .. } => JobStatus::Accepted,
            Transition::Decline { .. } => JobStatus::Pending,
            Transition::Reject { .. } => JobStatus::Rejected,
            Transition::Start { .. } => JobStatus::InProgress,
            Transition::Complete { .. } => JobStatus::Completed,
            Transition::Cancel { .. } => JobStatus::Cancelled,
        }
    }

    /// Whether `job` already reflects this transition for the same caller.
    ///
    /// Used to turn a retried write that hit a conflict into an idempotent
    /// success instead of an error.
    pub fn is_reflected_in(&self, job: &Job) -> bool {
        match self {
            Transition::Accept { driver, .. } => {
                job.status.is_active() && job.is_assigned_to(driver)
            }
            Transition::Decline { driver } => job.is_declined_by(driver),
            Transition::Reject { driver } => {
                job.status == JobStatus::Rejected && job.rejected_by.as_ref() == Some(driver)
            }
            Transition::Start { driver } => {
                job.status == JobStatus::InProgress && job.is_assigned_to(driver)
            }
            Transition::Complete { driver } => {
                job.status == JobStatus::Completed && job.is_assigned_to(driver)
            }
            Transition::Cancel { by } => {
                job.status == JobStatus::Cancelled && job.cancelled_by.as_ref() == Some(by)
            }
        }
    }

    /// Apply the transition to `job`, returning the new record.
    ///
    /// Timestamps are stamped with `now` clamped to the job's last update so
    /// they never move backwards. Returns `Ok(None)` when the transition is
    /// already reflected and nothing needs to be written.
    pub fn apply(&self, job: &Job, now: DateTime<Utc>) -> Result<Option<Job>, RidelineError> {
        let now = now.max(job.updated_at);
        let mut next = job.clone();

        match self {
            Transition::Accept { driver, snapshot } => {
                self.require_status(job, &[JobStatus::Pending])?;
                if let Some(owner) = &job.assigned_driver
                    && owner != driver
                {
                    return Err(RidelineError::precondition(
                        &job.id,
                        Precondition::OwnedByAnotherDriver,
                    ));
                }
                next.assigned_driver = Some(driver.clone());
                next.driver_snapshot = Some(snapshot.clone());
                next.accepted_at.get_or_insert(now);
            }
            Transition::Decline { driver } => {
                self.require_status(job, &[JobStatus::Pending])?;
                if job.is_declined_by(driver) {
                    return Ok(None);
                }
                next.declines.push(Decline {
                    driver: driver.clone(),
                    at: now,
                });
            }
            Transition::Reject { driver } => {
                self.require_status(job, &[JobStatus::Pending])?;
                if let Some(owner) = &job.assigned_driver
                    && owner != driver
                {
                    return Err(RidelineError::precondition(
                        &job.id,
                        Precondition::OwnedByAnotherDriver,
                    ));
                }
                next.rejected_by = Some(driver.clone());
                next.rejected_at.get_or_insert(now);
            }
            Transition::Start { driver } => {
                self.require_status(job, &[JobStatus::Accepted])?;
                self.require_assignee(job, driver)?;
                next.started_at.get_or_insert(now);
            }
            Transition::Complete { driver } => {
                self.require_status(job, &[JobStatus::InProgress])?;
                self.require_assignee(job, driver)?;
                next.completed_at.get_or_insert(now);
            }
            Transition::Cancel { by } => match by {
                Actor::Driver(driver) => {
                    self.require_status(job, &JobStatus::ACTIVE)?;
                    self.require_assignee(job, driver)?;
                    next.cancelled_by = Some(by.clone());
                    next.cancelled_at.get_or_insert(now);
                }
                Actor::Requester(requester) => {
                    self.require_status(
                        job,
                        &[JobStatus::Pending, JobStatus::Accepted, JobStatus::InProgress],
                    )?;
                    if &job.requester != requester {
                        return Err(RidelineError::precondition(
                            &job.id,
                            Precondition::NotRequester,
                        ));
                    }
                    next.cancelled_by = Some(by.clone());
                    next.cancelled_at.get_or_insert(now);
                }
            },
        }

        next.status = self.target();
        next.revision = job.revision + 1;
        next.updated_at = now;
        Ok(Some(next))
    }

    fn require_status(&self, job: &Job, allowed: &[JobStatus]) -> Result<(), RidelineError> {
        if allowed.contains(&job.status) {
            Ok(())
        } else {
            Err(RidelineError::precondition(
                &job.id,
                Precondition::WrongStatus { actual: job.status },
            ))
        }
    }

    fn require_assignee(&self, job: &Job, driver: &DriverId) -> Result<(), RidelineError> {
        if job.is_assigned_to(driver) {
            Ok(())
        } else {
            Err(RidelineError::precondition(
                &job.id,
                Precondition::NotAssignedDriver,
            ))
        }
    }
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed domain operations over the job and profile stores.
//!
//! The gateway owns no state. It names the filters each driver stream uses
//! and forwards conditional writes to the store unchanged.

use std::sync::Arc;

use rideline_config::model::{AssignmentMode, ViewConfig};
use rideline_core::{
    Actor, DriverId, DriverProfile, Identity, Job, JobFilter, JobId, JobStatus, JobStore,
    JobStream, NewJob, ProfilePatch, ProfileStore, RequesterId, RidelineError, Transition,
};
use tracing::debug;

use crate::reconcile::StreamKind;

/// Thin typed wrapper around the store adapters.
#[derive(Clone)]
pub struct JobGateway {
    jobs: Arc<dyn JobStore + Send + Sync>,
    profiles: Arc<dyn ProfileStore + Send + Sync>,
}

impl JobGateway {
    pub fn new(
        jobs: Arc<dyn JobStore + Send + Sync>,
        profiles: Arc<dyn ProfileStore + Send + Sync>,
    ) -> Self {
        Self { jobs, profiles }
    }

    /// Gateway over a single backend that stores both jobs and profiles.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: JobStore + ProfileStore + Send + Sync + 'static,
    {
        Self {
            jobs: store.clone(),
            profiles: store,
        }
    }

    /// Return the driver's profile, creating it from `identity` if absent.
    pub async fn create_profile(&self, identity: &Identity) -> Result<DriverProfile, RidelineError> {
        self.profiles.get_or_create_profile(identity).await
    }

    pub async fn profile(&self, driver: &DriverId) -> Result<Option<DriverProfile>, RidelineError> {
        self.profiles.get_profile(driver).await
    }

    pub async fn update_profile(
        &self,
        driver: &DriverId,
        patch: &ProfilePatch,
    ) -> Result<DriverProfile, RidelineError> {
        self.profiles.update_profile(driver, patch).await
    }

    /// Requester-side job creation.
    pub async fn create_job(&self, new: NewJob) -> Result<Job, RidelineError> {
        self.jobs.create_job(new).await
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, RidelineError> {
        self.jobs.get_job(id).await
    }

    /// Conditional write: applies only while the stored status equals `expected`.
    pub async fn transition(
        &self,
        id: &JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Job, RidelineError> {
        debug!(job_id = %id, expected = %expected, transition = transition.name(), "conditional write");
        self.jobs.write(id, expected, transition).await
    }

    /// Requester-side cancellation of a job they own.
    pub async fn cancel_as_requester(
        &self,
        id: &JobId,
        requester: &RequesterId,
    ) -> Result<Job, RidelineError> {
        let job = self.jobs.get_job(id).await?;
        self.transition(
            id,
            job.status,
            Transition::Cancel {
                by: Actor::Requester(requester.clone()),
            },
        )
        .await
    }

    /// Unassigned pending jobs `driver` has not declined. Unlimited, so jobs
    /// beyond the visible window surface as the window drains.
    pub async fn subscribe_unassigned(&self, driver: &DriverId) -> Result<JobStream, RidelineError> {
        self.jobs.subscribe(JobFilter::offered_to(driver)).await
    }

    pub async fn subscribe_assigned_to(&self, driver: &DriverId) -> Result<JobStream, RidelineError> {
        self.jobs.subscribe(JobFilter::active_for(driver)).await
    }

    pub async fn subscribe_history(
        &self,
        driver: &DriverId,
        limit: usize,
    ) -> Result<JobStream, RidelineError> {
        self.jobs
            .subscribe(JobFilter::history_for(driver).with_limit(limit))
            .await
    }

    /// Open the feed backing one of a driver's streams.
    pub async fn subscribe_stream(
        &self,
        stream: StreamKind,
        driver: &DriverId,
        mode: AssignmentMode,
        view: &ViewConfig,
    ) -> Result<JobStream, RidelineError> {
        self.jobs
            .subscribe(stream_filter(stream, driver, mode, view))
            .await
    }
}

/// The filter a driver stream subscribes with under `mode`.
///
/// In the pull model the pool is every unassigned pending job this driver has
/// not declined, and the rejected stream follows jobs this driver declined.
/// In the pre-assigned model the pool holds jobs assigned to this driver and
/// the rejected stream holds jobs this driver rejected terminally.
///
/// Pool feeds are unlimited: a store limit only windows the first snapshot,
/// so the reconciler truncates the pool to `pool_limit` instead.
pub fn stream_filter(
    stream: StreamKind,
    driver: &DriverId,
    mode: AssignmentMode,
    view: &ViewConfig,
) -> JobFilter {
    match (stream, mode) {
        (StreamKind::Pool, AssignmentMode::Pull) => JobFilter::offered_to(driver),
        (StreamKind::Pool, AssignmentMode::PreAssigned) => JobFilter::pre_assigned_pending(driver),
        (StreamKind::Active, _) => JobFilter::active_for(driver),
        (StreamKind::History, _) => JobFilter::history_for(driver).with_limit(view.history_limit),
        (StreamKind::Rejected, AssignmentMode::Pull) => {
            JobFilter::declined_by(driver).with_limit(view.history_limit)
        }
        (StreamKind::Rejected, AssignmentMode::PreAssigned) => {
            JobFilter::rejected_by(driver).with_limit(view.history_limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rideline_core::Assignee;

    #[test]
    fn pull_streams() {
        let d = DriverId::new("d-1");
        let view = ViewConfig::default();
        let pool = stream_filter(StreamKind::Pool, &d, AssignmentMode::Pull, &view);
        assert_eq!(pool.assignee, Some(Assignee::Unassigned));
        assert_eq!(pool.not_declined_by, Some(d.clone()));
        assert_eq!(pool.limit, None);

        let rejected = stream_filter(StreamKind::Rejected, &d, AssignmentMode::Pull, &view);
        assert_eq!(rejected.declined_by, Some(d.clone()));
        assert!(rejected.statuses.is_none());
    }

    #[test]
    fn pre_assigned_streams() {
        let d = DriverId::new("d-1");
        let view = ViewConfig::default();
        let pool = stream_filter(StreamKind::Pool, &d, AssignmentMode::PreAssigned, &view);
        assert_eq!(pool.assignee, Some(Assignee::Driver(d.clone())));
        assert_eq!(pool.statuses, Some(vec![JobStatus::Pending]));
        assert_eq!(pool.limit, None);

        let rejected = stream_filter(StreamKind::Rejected, &d, AssignmentMode::PreAssigned, &view);
        assert_eq!(rejected.rejected_by, Some(d.clone()));
        assert_eq!(rejected.statuses, Some(vec![JobStatus::Rejected]));
    }

    #[test]
    fn active_and_history_ignore_mode() {
        let d = DriverId::new("d-1");
        let view = ViewConfig::default();
        for mode in [AssignmentMode::Pull, AssignmentMode::PreAssigned] {
            assert_eq!(
                stream_filter(StreamKind::Active, &d, mode, &view),
                JobFilter::active_for(&d)
            );
            assert_eq!(
                stream_filter(StreamKind::History, &d, mode, &view).limit,
                Some(view.history_limit)
            );
        }
    }
}

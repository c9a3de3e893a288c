// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The public operation surface presentation code calls.
//!
//! Every lifecycle operation is a guarded write: a fail-fast precondition
//! check against the current view, then a conditional write expecting the
//! job's last known status. A conflict is reported, never retried with the
//! stale expectation. Successful results are handed to the engine as
//! optimistic updates and the operation returns once the view reflects them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rideline_config::model::{AssignmentMode, WriteConfig};
use rideline_core::{
    Actor, DriverId, DriverProfile, DriverSnapshot, Job, JobId, JobStatus, Precondition,
    ProfilePatch, RidelineError, Transition,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::events::{Connectivity, DriverEvent};
use crate::gateway::JobGateway;
use crate::recording;
use crate::session::SessionState;
use crate::subscription::Inbound;
use crate::view::DriverView;

/// Result of a lifecycle operation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This call's write was applied.
    Applied(Job),
    /// The job already reflected the caller's intent; nothing was written.
    AlreadyApplied(Job),
}

impl TransitionOutcome {
    pub fn job(&self) -> &Job {
        match self {
            TransitionOutcome::Applied(job) | TransitionOutcome::AlreadyApplied(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            TransitionOutcome::Applied(job) | TransitionOutcome::AlreadyApplied(job) => job,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// How a conditional write's result reads from the caller's side.
#[derive(Debug)]
enum WriteVerdict {
    Applied(Job),
    /// The store rejected the write but already shows the caller's intent.
    AlreadyApplied(Job),
    /// Someone else moved the job; carries the store's record.
    Lost { current: Job, err: RidelineError },
    Failed(RidelineError),
}

impl WriteVerdict {
    fn judge(result: Result<Job, RidelineError>, transition: &Transition) -> Self {
        match result {
            Ok(updated) => WriteVerdict::Applied(updated),
            Err(RidelineError::Conflict { current, .. }) if transition.is_reflected_in(&current) => {
                WriteVerdict::AlreadyApplied(*current)
            }
            Err(RidelineError::Conflict {
                job_id,
                expected,
                current,
            }) => WriteVerdict::Lost {
                current: (*current).clone(),
                err: RidelineError::Conflict {
                    job_id,
                    expected,
                    current,
                },
            },
            Err(err) => WriteVerdict::Failed(err),
        }
    }
}

/// Cheap-to-clone handle to a driver session's operations.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

struct Inner {
    driver: DriverId,
    mode: AssignmentMode,
    writes: WriteConfig,
    gateway: JobGateway,
    profile: watch::Sender<DriverProfile>,
    view: watch::Receiver<Arc<DriverView>>,
    connectivity: watch::Receiver<Connectivity>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<DriverEvent>,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
}

impl LifecycleController {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        driver: DriverId,
        mode: AssignmentMode,
        writes: WriteConfig,
        gateway: JobGateway,
        profile: DriverProfile,
        view: watch::Receiver<Arc<DriverView>>,
        connectivity: watch::Receiver<Connectivity>,
        state: watch::Receiver<SessionState>,
        events: broadcast::Sender<DriverEvent>,
        inbound: mpsc::Sender<Inbound>,
        cancel: CancellationToken,
    ) -> Self {
        let (profile, _) = watch::channel(profile);
        Self {
            inner: Arc::new(Inner {
                driver,
                mode,
                writes,
                gateway,
                profile,
                view,
                connectivity,
                state,
                events,
                inbound,
                cancel,
            }),
        }
    }

    pub fn driver(&self) -> &DriverId {
        &self.inner.driver
    }

    pub fn mode(&self) -> AssignmentMode {
        self.inner.mode
    }

    /// The current reconciled view.
    pub fn view(&self) -> Arc<DriverView> {
        self.inner.view.borrow().clone()
    }

    /// A receiver notified whenever the view changes.
    pub fn watch_view(&self) -> watch::Receiver<Arc<DriverView>> {
        self.inner.view.clone()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.inner.connectivity.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until every stream has delivered its initial snapshot.
    pub async fn wait_until_synced(&self) -> Result<(), RidelineError> {
        let mut state = self.inner.state.clone();
        let reached = state
            .wait_for(|s| *s != SessionState::Syncing)
            .await
            .map(|s| *s)
            .map_err(|_| RidelineError::SessionClosed)?;
        match reached {
            SessionState::Live => Ok(()),
            _ => Err(RidelineError::SessionClosed),
        }
    }

    pub fn profile(&self) -> DriverProfile {
        self.inner.profile.borrow().clone()
    }

    /// Apply a settings update to the driver's profile.
    ///
    /// The new details are copied onto jobs accepted from now on.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<DriverProfile, RidelineError> {
        self.ensure_open()?;
        let profile = self
            .inner
            .gateway
            .update_profile(&self.inner.driver, patch)
            .await?;
        self.inner.profile.send_replace(profile.clone());
        info!(driver_id = %self.inner.driver, "driver profile updated");
        Ok(profile)
    }

    /// Take a job from the pool as the driver's active job.
    pub async fn accept(&self, job_id: &JobId) -> Result<TransitionOutcome, RidelineError> {
        let view = self.view();
        if let Some(active) = &view.active {
            if &active.id == job_id {
                return Ok(self.already("accept", active));
            }
            return Err(self.refuse(
                "accept",
                job_id,
                Precondition::AlreadyHasActiveJob {
                    active: active.id.clone(),
                },
            ));
        }
        let job = self.offered(&view, job_id, "accept")?;
        let transition = Transition::Accept {
            driver: self.inner.driver.clone(),
            snapshot: DriverSnapshot::from(&self.profile()),
        };
        self.perform(job, transition).await
    }

    /// Pass on a pooled job.
    ///
    /// In the pull model this only hides the job from this driver; in the
    /// pre-assigned model it terminally rejects it.
    pub async fn reject(&self, job_id: &JobId) -> Result<TransitionOutcome, RidelineError> {
        let view = self.view();
        if let Some(job) = view.history_job(job_id)
            && job.status == JobStatus::Rejected
        {
            return Ok(self.already("reject", job));
        }
        let job = self.offered(&view, job_id, "reject")?;
        let driver = self.inner.driver.clone();
        let transition = match self.inner.mode {
            AssignmentMode::Pull => Transition::Decline { driver },
            AssignmentMode::PreAssigned => Transition::Reject { driver },
        };
        self.perform(job, transition).await
    }

    /// Begin the active job.
    pub async fn start(&self, job_id: &JobId) -> Result<TransitionOutcome, RidelineError> {
        let view = self.view();
        let job = self.active(&view, job_id, "start")?;
        if job.status == JobStatus::InProgress {
            return Ok(self.already("start", job));
        }
        let transition = Transition::Start {
            driver: self.inner.driver.clone(),
        };
        self.perform(job, transition).await
    }

    /// Finish the active job.
    pub async fn complete(&self, job_id: &JobId) -> Result<TransitionOutcome, RidelineError> {
        let view = self.view();
        if let Some(job) = view.history_job(job_id)
            && job.status == JobStatus::Completed
        {
            return Ok(self.already("complete", job));
        }
        let job = self.active(&view, job_id, "complete")?;
        if job.status != JobStatus::InProgress {
            return Err(self.refuse(
                "complete",
                job_id,
                Precondition::WrongStatus { actual: job.status },
            ));
        }
        let transition = Transition::Complete {
            driver: self.inner.driver.clone(),
        };
        self.perform(job, transition).await
    }

    /// Abandon the active job before completion.
    pub async fn cancel(&self, job_id: &JobId) -> Result<TransitionOutcome, RidelineError> {
        let view = self.view();
        let by = Actor::Driver(self.inner.driver.clone());
        if let Some(job) = view.history_job(job_id)
            && job.status == JobStatus::Cancelled
            && job.cancelled_by.as_ref() == Some(&by)
        {
            return Ok(self.already("cancel", job));
        }
        let job = self.active(&view, job_id, "cancel")?;
        self.perform(job, Transition::Cancel { by }).await
    }

    fn offered<'a>(
        &self,
        view: &'a DriverView,
        job_id: &JobId,
        op: &'static str,
    ) -> Result<&'a Job, RidelineError> {
        view.pool_job(job_id)
            .ok_or_else(|| self.refuse(op, job_id, Precondition::NotInPool))
    }

    fn active<'a>(
        &self,
        view: &'a DriverView,
        job_id: &JobId,
        op: &'static str,
    ) -> Result<&'a Job, RidelineError> {
        view.active
            .as_ref()
            .filter(|job| &job.id == job_id)
            .ok_or_else(|| self.refuse(op, job_id, Precondition::NotActiveJob))
    }

    fn already(&self, op: &'static str, job: &Job) -> TransitionOutcome {
        debug!(driver_id = %self.inner.driver, job_id = %job.id, op, "already applied");
        recording::record_transition(op, "already_applied");
        TransitionOutcome::AlreadyApplied(job.clone())
    }

    fn refuse(&self, op: &'static str, job_id: &JobId, reason: Precondition) -> RidelineError {
        info!(driver_id = %self.inner.driver, job_id = %job_id, op, reason = %reason, "operation refused");
        recording::record_transition(op, "refused");
        RidelineError::precondition(job_id, reason)
    }

    fn ensure_open(&self) -> Result<(), RidelineError> {
        if self.inner.cancel.is_cancelled() {
            return Err(RidelineError::SessionClosed);
        }
        Ok(())
    }

    async fn perform(
        &self,
        job: &Job,
        transition: Transition,
    ) -> Result<TransitionOutcome, RidelineError> {
        self.ensure_open()?;
        let op = transition.name();
        let started = Instant::now();
        let result = self.write_with_retry(job, &transition).await;
        recording::record_write_latency(started.elapsed().as_secs_f64());

        match WriteVerdict::judge(result, &transition) {
            WriteVerdict::Applied(updated) => {
                info!(
                    driver_id = %self.inner.driver,
                    job_id = %updated.id,
                    op,
                    status = %updated.status,
                    revision = updated.revision,
                    "transition applied"
                );
                recording::record_transition(op, "applied");
                self.confirm(updated.clone()).await;
                Ok(TransitionOutcome::Applied(updated))
            }
            WriteVerdict::AlreadyApplied(current) => {
                // An earlier attempt of ours landed; the store already shows it.
                recording::record_transition(op, "already_applied");
                self.confirm(current.clone()).await;
                Ok(TransitionOutcome::AlreadyApplied(current))
            }
            WriteVerdict::Lost { current, err } => {
                info!(
                    driver_id = %self.inner.driver,
                    job_id = %job.id,
                    op,
                    expected = %job.status,
                    found = %current.status,
                    "job changed underneath us"
                );
                recording::record_conflict(op);
                recording::record_transition(op, "failed");
                // The store's record is newer than our view; show it now.
                self.confirm(current).await;
                Err(err)
            }
            WriteVerdict::Failed(err) => {
                recording::record_transition(op, "failed");
                Err(err)
            }
        }
    }

    async fn write_with_retry(
        &self,
        job: &Job,
        transition: &Transition,
    ) -> Result<Job, RidelineError> {
        let max_attempts = self.inner.writes.max_attempts.max(1);
        let base = Duration::from_millis(self.inner.writes.retry_backoff_ms);
        let mut backoff = Backoff::new(base, base.saturating_mul(8));
        let mut attempt = 1;
        loop {
            let result = self
                .inner
                .gateway
                .transition(&job.id, job.status, transition.clone())
                .await;
            match result {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        driver_id = %self.inner.driver,
                        job_id = %job.id,
                        attempt,
                        error = %err,
                        "conditional write failed, retrying"
                    );
                    tokio::select! {
                        _ = self.inner.cancel.cancelled() => return Err(RidelineError::SessionClosed),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Hand a write result to the engine and wait until it is reflected.
    ///
    /// After teardown the result is dropped.
    async fn confirm(&self, job: Job) {
        let (applied, done) = oneshot::channel();
        let job_id = job.id.clone();
        if self
            .inner
            .inbound
            .send(Inbound::Optimistic { job, applied })
            .await
            .is_err()
            || done.await.is_err()
        {
            debug!(driver_id = %self.inner.driver, job_id = %job_id, "session closed, write result dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rideline_core::{Fare, NewJob, RequesterId};

    fn snapshot() -> DriverSnapshot {
        DriverSnapshot {
            name: "Dee".into(),
            vehicle_model: "Corolla".into(),
            license_plate: "ABC-123".into(),
        }
    }

    fn accept(driver: &str) -> Transition {
        Transition::Accept {
            driver: DriverId::new(driver),
            snapshot: snapshot(),
        }
    }

    fn conflict(current: Job) -> Result<Job, RidelineError> {
        Err(RidelineError::Conflict {
            job_id: current.id.clone(),
            expected: JobStatus::Pending,
            current: Box::new(current),
        })
    }

    fn job() -> Job {
        Job::from_new(
            JobId::new("j-1"),
            NewJob {
                requester: RequesterId::new("r"),
                requester_name: None,
                assigned_driver: None,
                origin: "A".into(),
                destination: "B".into(),
                waypoints: vec![],
                scheduled_time: chrono::Utc::now(),
                fare: Fare::from_cents(900),
                passengers: 1,
                bags: 0,
                distance: None,
                duration: None,
                after_hours: false,
                round_trip: false,
            },
            chrono::Utc::now(),
        )
    }

    #[test]
    fn outcome_accessors() {
        let applied = TransitionOutcome::Applied(job());
        assert!(applied.was_applied());
        assert_eq!(applied.job().id.as_str(), "j-1");

        let already = TransitionOutcome::AlreadyApplied(job());
        assert!(!already.was_applied());
        assert_eq!(already.into_job().status, JobStatus::Pending);
    }

    #[test]
    fn conflict_showing_our_acceptance_is_already_applied() {
        let ours = accept("d-1")
            .apply(&job(), chrono::Utc::now())
            .unwrap()
            .unwrap();
        match WriteVerdict::judge(conflict(ours.clone()), &accept("d-1")) {
            WriteVerdict::AlreadyApplied(current) => assert_eq!(current, ours),
            other => panic!("expected already applied, got {other:?}"),
        }
    }

    #[test]
    fn conflict_with_another_driver_is_lost() {
        let theirs = accept("d-2")
            .apply(&job(), chrono::Utc::now())
            .unwrap()
            .unwrap();
        match WriteVerdict::judge(conflict(theirs.clone()), &accept("d-1")) {
            WriteVerdict::Lost { current, err } => {
                assert_eq!(current, theirs);
                assert!(matches!(err, RidelineError::Conflict { .. }));
            }
            other => panic!("expected lost, got {other:?}"),
        }
    }

    #[test]
    fn transport_errors_are_plain_failures() {
        let verdict = WriteVerdict::judge(Err(RidelineError::transport("offline")), &accept("d-1"));
        assert!(matches!(verdict, WriteVerdict::Failed(RidelineError::Transport { .. })));
    }
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory job and profile store for deterministic testing.
//!
//! `MockJobStore` implements `JobStore` and `ProfileStore` over a mutex-guarded
//! map. Every applied write is broadcast to open feeds while the lock is held,
//! so feeds observe writes in commit order. Faults can be injected to exercise
//! resubscription and write retries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use rideline_core::{
    AdapterType, DriverId, DriverProfile, FeedItem, HealthStatus, Identity, Job, JobFilter,
    JobId, JobStatus, JobStore, JobStream, NewJob, PluginAdapter, Precondition, ProfilePatch,
    ProfileStore, RidelineError, SnapshotEvent, Transition,
};

/// Broadcast to open feeds.
#[derive(Debug, Clone)]
enum Signal {
    Write { before: Option<Job>, after: Job },
    /// Every open feed fails with a transport error.
    Disconnect,
}

#[derive(Default)]
struct State {
    jobs: BTreeMap<JobId, Job>,
    profiles: HashMap<DriverId, DriverProfile>,
    next_id: u64,
}

/// A mock store for testing.
///
/// Job ids are sequential (`job-1`, `job-2`, ...) so tests can predict them.
pub struct MockJobStore {
    state: Mutex<State>,
    signals: broadcast::Sender<Signal>,
    fail_subscribes: AtomicU32,
    fail_writes: AtomicU32,
    writes: AtomicUsize,
    subscribes: AtomicUsize,
}

impl MockJobStore {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(1024);
        Self {
            state: Mutex::new(State::default()),
            signals,
            fail_subscribes: AtomicU32::new(0),
            fail_writes: AtomicU32::new(0),
            writes: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
        }
    }

    /// Fail every open change feed with a transport error.
    pub fn disconnect_all(&self) {
        let _ = self.signals.send(Signal::Disconnect);
    }

    /// Refuse the next `n` subscription attempts with a transport error.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.fail_subscribes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` conditional writes with a transport error, before
    /// they reach the stored record.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Number of conditional writes attempted, including failed ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful subscriptions opened.
    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Number of change feeds currently open.
    pub fn open_feeds(&self) -> usize {
        self.signals.receiver_count()
    }

    /// Current stored record, bypassing the trait.
    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    /// Every stored job, ordered by id.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.values().cloned().collect()
    }

    /// Overwrite a stored record as an out-of-band writer would, bumping its
    /// revision and notifying feeds.
    pub fn force(&self, job: Job) -> Job {
        let mut state = self.lock();
        let before = state.jobs.get(&job.id).cloned();
        let mut after = job;
        after.revision = before.as_ref().map_or(1, |b| b.revision + 1);
        state.jobs.insert(after.id.clone(), after.clone());
        let _ = self.signals.send(Signal::Write {
            before,
            after: after.clone(),
        });
        after
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not cascade into every other assertion.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockJobStore {
    fn name(&self) -> &str {
        "mock-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::JobStore
    }

    async fn health_check(&self) -> Result<HealthStatus, RidelineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RidelineError> {
        Ok(())
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn create_job(&self, new: NewJob) -> Result<Job, RidelineError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = JobId::new(format!("job-{}", state.next_id));
        let job = Job::from_new(id, new, Utc::now());
        state.jobs.insert(job.id.clone(), job.clone());
        let _ = self.signals.send(Signal::Write {
            before: None,
            after: job.clone(),
        });
        Ok(job)
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, RidelineError> {
        self.job(id).ok_or_else(|| RidelineError::NotFound {
            kind: "job",
            id: id.to_string(),
        })
    }

    async fn subscribe(&self, filter: JobFilter) -> Result<JobStream, RidelineError> {
        if Self::take_fault(&self.fail_subscribes) {
            return Err(RidelineError::transport("injected subscribe failure"));
        }
        // Snapshot and receiver are taken under the lock so no write falls between them.
        let (snapshot, rx) = {
            let state = self.lock();
            (filter.snapshot(state.jobs.values()), self.signals.subscribe())
        };
        self.subscribes.fetch_add(1, Ordering::SeqCst);

        let feed = stream::unfold(
            (Some(snapshot), rx, filter, false),
            |(snapshot, mut rx, filter, ended)| async move {
                if ended {
                    return None;
                }
                if let Some(jobs) = snapshot {
                    return Some((Ok(FeedItem::Snapshot(jobs)), (None, rx, filter, false)));
                }
                loop {
                    match rx.recv().await {
                        Ok(Signal::Write { before, after }) => {
                            if let Some(kind) = filter.classify(before.as_ref(), &after) {
                                let item = FeedItem::Change(SnapshotEvent { kind, job: after });
                                return Some((Ok(item), (None, rx, filter, false)));
                            }
                        }
                        Ok(Signal::Disconnect) => {
                            let err = RidelineError::transport("injected disconnect");
                            return Some((Err(err), (None, rx, filter, true)));
                        }
                        Err(RecvError::Lagged(n)) => {
                            let err = RidelineError::transport(format!("feed lagged by {n}"));
                            return Some((Err(err), (None, rx, filter, true)));
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        );
        Ok(Box::pin(feed))
    }

    async fn write(
        &self,
        id: &JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Job, RidelineError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.fail_writes) {
            return Err(RidelineError::transport("injected write failure"));
        }

        let mut state = self.lock();
        let Some(current) = state.jobs.get(id).cloned() else {
            return Err(RidelineError::NotFound {
                kind: "job",
                id: id.to_string(),
            });
        };
        if current.status != expected {
            return Err(RidelineError::Conflict {
                job_id: id.clone(),
                expected,
                current: Box::new(current),
            });
        }
        let Some(next) = transition.apply(&current, Utc::now())? else {
            return Ok(current);
        };

        if next.status.is_active()
            && !current.status.is_active()
            && let Some(driver) = &next.assigned_driver
            && let Some(active) = state
                .jobs
                .values()
                .find(|j| j.id != next.id && j.status.is_active() && j.is_assigned_to(driver))
        {
            return Err(RidelineError::precondition(
                id,
                Precondition::AlreadyHasActiveJob {
                    active: active.id.clone(),
                },
            ));
        }

        state.jobs.insert(next.id.clone(), next.clone());
        let _ = self.signals.send(Signal::Write {
            before: Some(current),
            after: next.clone(),
        });
        Ok(next)
    }
}

#[async_trait]
impl ProfileStore for MockJobStore {
    async fn get_or_create_profile(
        &self,
        identity: &Identity,
    ) -> Result<DriverProfile, RidelineError> {
        let mut state = self.lock();
        let profile = state
            .profiles
            .entry(identity.driver_id.clone())
            .or_insert_with(|| DriverProfile::from_identity(identity, Utc::now()));
        Ok(profile.clone())
    }

    async fn get_profile(&self, id: &DriverId) -> Result<Option<DriverProfile>, RidelineError> {
        Ok(self.lock().profiles.get(id).cloned())
    }

    async fn update_profile(
        &self,
        id: &DriverId,
        patch: &ProfilePatch,
    ) -> Result<DriverProfile, RidelineError> {
        let mut state = self.lock();
        let profile = state
            .profiles
            .get_mut(id)
            .ok_or_else(|| RidelineError::NotFound {
                kind: "driver profile",
                id: id.to_string(),
            })?;
        profile.apply(patch, Utc::now());
        Ok(profile.clone())
    }
}

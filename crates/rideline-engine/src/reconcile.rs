// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-stream reconciliation into one [`DriverView`].
//!
//! A [`Reconciler`] keeps one keyed map per subscription plus an overlay of
//! optimistic write results. Every input triggers a full recompute: for each
//! job id the record with the highest store revision wins, and that record
//! alone decides where the job is placed. A held record older than the
//! highest revision any stream has reported is stale and is not placed, even
//! when the newer record was a removal. The result depends only on the final
//! contents of the maps and those high-water marks, so any interleaving of
//! the same per-stream events converges to the same view.
//!
//! The reconciler is synchronous and owns no tasks. A driver session feeds
//! it from a single ordered queue.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rideline_config::RidelineConfig;
use rideline_config::model::AssignmentMode;
use rideline_core::{ChangeKind, DriverId, FeedItem, Job, JobId, JobStatus};
use tracing::{debug, warn};

use crate::events::DriverEvent;
use crate::view::{DriverView, Section};

/// The logical subscriptions a driver session holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    /// Jobs offered to the driver.
    Pool,
    /// The driver's accepted or in-progress jobs.
    Active,
    /// The driver's completed and cancelled jobs.
    History,
    /// Jobs the driver rejected or declined.
    Rejected,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Pool,
        StreamKind::Active,
        StreamKind::History,
        StreamKind::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Pool => "pool",
            StreamKind::Active => "active",
            StreamKind::History => "history",
            StreamKind::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement policy for a driver's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub mode: AssignmentMode,
    pub pool_limit: usize,
    pub history_limit: usize,
}

impl ReconcileSettings {
    pub fn from_config(config: &RidelineConfig) -> Self {
        Self {
            mode: config.assignment.mode,
            pool_limit: config.view.pool_limit,
            history_limit: config.view.history_limit,
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from_config(&RidelineConfig::default())
    }
}

/// Jobs remembered after leaving every stream, oldest evicted first.
const RETIRED_CAPACITY: usize = 1024;

/// What is kept about a job no stream holds any more.
#[derive(Debug, Clone, Copy)]
struct Retired {
    revision: u64,
    live: bool,
    seq: u64,
}

/// Outcome of feeding one input to the reconciler.
#[derive(Debug, Default)]
pub struct Merge {
    /// The new view, present only when its fingerprint changed.
    pub view: Option<Arc<DriverView>>,
    pub events: Vec<DriverEvent>,
}

impl Merge {
    pub fn is_empty(&self) -> bool {
        self.view.is_none() && self.events.is_empty()
    }
}

/// Per-driver merge state.
pub struct Reconciler {
    driver: DriverId,
    settings: ReconcileSettings,
    streams: HashMap<StreamKind, HashMap<JobId, Job>>,
    synced: BTreeSet<StreamKind>,
    /// Write results not yet echoed back by any stream.
    optimistic: HashMap<JobId, Job>,
    /// Highest revision any stream has reported per job, removals included.
    observed: HashMap<JobId, u64>,
    /// Jobs placed in the active slot or pool at some point; entering
    /// history from there is a live lifecycle change worth an event.
    seen_live: HashSet<JobId>,
    /// High-water marks of jobs that left every stream, so late stale
    /// records and write results stay suppressed.
    retired: HashMap<JobId, Retired>,
    retired_order: VecDeque<(JobId, u64)>,
    retire_seq: u64,
    inconsistency: Option<(JobId, Vec<JobId>)>,
    view: Arc<DriverView>,
}

impl Reconciler {
    pub fn new(driver: DriverId, settings: ReconcileSettings) -> Self {
        Self {
            driver,
            settings,
            streams: HashMap::new(),
            synced: BTreeSet::new(),
            optimistic: HashMap::new(),
            observed: HashMap::new(),
            seen_live: HashSet::new(),
            retired: HashMap::new(),
            retired_order: VecDeque::new(),
            retire_seq: 0,
            inconsistency: None,
            view: Arc::new(DriverView::default()),
        }
    }

    pub fn driver(&self) -> &DriverId {
        &self.driver
    }

    /// The most recently computed view.
    pub fn view(&self) -> Arc<DriverView> {
        Arc::clone(&self.view)
    }

    /// Whether every stream has delivered at least one snapshot.
    pub fn is_synced(&self) -> bool {
        StreamKind::ALL.iter().all(|s| self.synced.contains(s))
    }

    /// Number of jobs with live bookkeeping (revision marks or lifecycle
    /// tracking), retired ones excluded.
    pub fn tracked_jobs(&self) -> usize {
        let mut ids: HashSet<&JobId> = self.observed.keys().collect();
        ids.extend(self.seen_live.iter());
        ids.len()
    }

    /// Number of optimistic entries awaiting confirmation.
    pub fn pending_optimistic(&self) -> usize {
        self.optimistic.len()
    }

    /// Apply one feed item from `stream` and recompute.
    pub fn apply_feed(&mut self, stream: StreamKind, item: FeedItem) -> Merge {
        match item {
            FeedItem::Snapshot(jobs) => {
                debug!(stream = %stream, jobs = jobs.len(), "applying snapshot");
                let mut map = HashMap::with_capacity(jobs.len());
                for job in jobs {
                    self.observe(&job);
                    map.insert(job.id.clone(), job);
                }
                self.streams.insert(stream, map);
                self.synced.insert(stream);
                self.prune();
            }
            FeedItem::Change(event) => {
                debug!(
                    stream = %stream,
                    kind = %event.kind,
                    job_id = %event.job.id,
                    revision = event.job.revision,
                    "applying change"
                );
                self.observe(&event.job);
                let id = event.job.id.clone();
                let map = self.streams.entry(stream).or_default();
                let stale = map
                    .get(&id)
                    .is_some_and(|held| held.revision > event.job.revision);
                if stale {
                    debug!(stream = %stream, job_id = %id, "ignoring stale change");
                } else if event.kind == ChangeKind::Removed {
                    map.remove(&id);
                    self.retire_if_unheld(&id);
                } else {
                    map.insert(id, event.job);
                }
            }
        }
        self.recompute()
    }

    /// Overlay the result of a successful write until a stream confirms it.
    ///
    /// Ignored when any stream already reported this revision or a later one.
    pub fn apply_optimistic(&mut self, job: Job) -> Merge {
        let superseded = self
            .high_water(&job.id)
            .is_some_and(|seen| seen >= job.revision)
            || self
                .optimistic
                .get(&job.id)
                .is_some_and(|held| held.revision >= job.revision);
        if superseded {
            debug!(job_id = %job.id, revision = job.revision, "optimistic update already superseded");
            return Merge::default();
        }
        debug!(job_id = %job.id, revision = job.revision, status = %job.status, "applying optimistic update");
        self.optimistic.insert(job.id.clone(), job);
        self.recompute()
    }

    fn observe(&mut self, job: &Job) {
        if let Some(retired) = self.retired.remove(&job.id) {
            self.observed.insert(job.id.clone(), retired.revision);
            if retired.live {
                self.seen_live.insert(job.id.clone());
            }
        }
        let seen = self.observed.entry(job.id.clone()).or_insert(job.revision);
        *seen = (*seen).max(job.revision);
        let seen = *seen;
        if let Entry::Occupied(held) = self.optimistic.entry(job.id.clone())
            && held.get().revision <= seen
        {
            held.remove();
        }
    }

    /// Highest revision reported for `id`, retired jobs included.
    fn high_water(&self, id: &JobId) -> Option<u64> {
        self.observed
            .get(id)
            .or_else(|| self.retired.get(id).map(|r| &r.revision))
            .copied()
    }

    fn is_held(&self, id: &JobId) -> bool {
        self.optimistic.contains_key(id) || self.streams.values().any(|m| m.contains_key(id))
    }

    /// Retire bookkeeping for every job no stream or overlay holds any more.
    fn prune(&mut self) {
        let candidates: Vec<JobId> = self
            .observed
            .keys()
            .chain(self.seen_live.iter())
            .cloned()
            .collect();
        for id in candidates {
            self.retire_if_unheld(&id);
        }
    }

    /// Move `id` from live bookkeeping into the bounded retired set.
    fn retire_if_unheld(&mut self, id: &JobId) {
        if self.is_held(id) {
            return;
        }
        let observed = self.observed.remove(id);
        let live = self.seen_live.remove(id);
        let (revision, live) = match (observed, self.retired.get(id)) {
            (Some(revision), _) => (revision, live),
            (None, Some(prev)) => (prev.revision, live || prev.live),
            (None, None) => return,
        };
        self.retire_seq += 1;
        let seq = self.retire_seq;
        self.retired.insert(id.clone(), Retired { revision, live, seq });
        self.retired_order.push_back((id.clone(), seq));

        // Order entries whose job was revived or retired again are dead.
        while self.retired.len() > RETIRED_CAPACITY {
            let Some((oldest, seq)) = self.retired_order.pop_front() else {
                break;
            };
            if self.retired.get(&oldest).is_some_and(|r| r.seq == seq) {
                self.retired.remove(&oldest);
            }
        }
        if self.retired_order.len() > 2 * RETIRED_CAPACITY {
            let retired = &self.retired;
            self.retired_order
                .retain(|(id, seq)| retired.get(id).is_some_and(|r| r.seq == *seq));
        }
    }

    /// Decide where `job` belongs in this driver's view, if anywhere.
    ///
    /// Jobs declined in the pull model land in history projected as
    /// `rejected` for this driver, stamped with the decline time.
    fn place(&self, job: &Job) -> Option<(Section, Job)> {
        let me = &self.driver;
        if job.status.is_active() && job.is_assigned_to(me) {
            return Some((Section::Active, job.clone()));
        }
        if job.status == JobStatus::Pending && self.is_offered(job) {
            return Some((Section::Pool, job.clone()));
        }
        if job.status.is_terminal()
            && (job.is_assigned_to(me) || job.rejected_by.as_ref() == Some(me))
        {
            return Some((Section::History, job.clone()));
        }
        if let Some(decline) = job.decline_by(me) {
            let mut projected = job.clone();
            projected.status = JobStatus::Rejected;
            projected.rejected_by = Some(me.clone());
            projected.rejected_at = Some(decline.at);
            return Some((Section::History, projected));
        }
        None
    }

    fn is_offered(&self, job: &Job) -> bool {
        match self.settings.mode {
            AssignmentMode::Pull => {
                job.assigned_driver.is_none() && !job.is_declined_by(&self.driver)
            }
            AssignmentMode::PreAssigned => job.is_assigned_to(&self.driver),
        }
    }

    fn recompute(&mut self) -> Merge {
        let mut latest: HashMap<&JobId, &Job> = HashMap::new();
        for job in self
            .streams
            .values()
            .flat_map(|m| m.values())
            .chain(self.optimistic.values())
        {
            // Optimistic entries are always newer than the high-water mark.
            if self.high_water(&job.id).is_some_and(|seen| job.revision < seen) {
                continue;
            }
            match latest.entry(&job.id) {
                Entry::Vacant(slot) => {
                    slot.insert(job);
                }
                Entry::Occupied(mut slot) if slot.get().revision < job.revision => {
                    slot.insert(job);
                }
                Entry::Occupied(_) => {}
            }
        }

        let mut actives = Vec::new();
        let mut pool = Vec::new();
        let mut history = Vec::new();
        for job in latest.into_values() {
            match self.place(job) {
                Some((Section::Active, job)) => actives.push(job),
                Some((Section::Pool, job)) => pool.push(job),
                Some((Section::History, job)) => history.push(job),
                None => {}
            }
        }

        actives.sort_by(active_order);
        pool.sort_by(|a, b| {
            a.scheduled_time
                .cmp(&b.scheduled_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        pool.truncate(self.settings.pool_limit);
        history.sort_by(|a, b| {
            history_time(b)
                .cmp(&history_time(a))
                .then_with(|| a.id.cmp(&b.id))
        });
        history.truncate(self.settings.history_limit);

        let mut events = Vec::new();
        let mut actives = actives.into_iter();
        let active = actives.next();
        let ignored: Vec<JobId> = actives.map(|job| job.id).collect();
        self.track_inconsistency(active.as_ref(), ignored, &mut events);

        let next = DriverView {
            active,
            pool,
            history,
        };
        let prev_print = self.view.fingerprint();
        let next_print = next.fingerprint();
        if next_print == prev_print {
            return Merge {
                view: None,
                events,
            };
        }

        self.diff(&next, &mut events);
        if next_print.pool != prev_print.pool {
            events.push(DriverEvent::PoolUpdated {
                size: next.pool.len(),
            });
        }
        if next_print.history != prev_print.history {
            events.push(DriverEvent::HistoryUpdated {
                size: next.history.len(),
            });
        }
        let next = Arc::new(next);
        self.view = Arc::clone(&next);
        Merge {
            view: Some(next),
            events,
        }
    }

    fn track_inconsistency(
        &mut self,
        active: Option<&Job>,
        ignored: Vec<JobId>,
        events: &mut Vec<DriverEvent>,
    ) {
        let current = match active {
            Some(kept) if !ignored.is_empty() => Some((kept.id.clone(), ignored)),
            _ => None,
        };
        if current != self.inconsistency
            && let Some((kept, ignored)) = &current
        {
            warn!(
                driver_id = %self.driver,
                kept = %kept,
                ignored = ?ignored,
                "data inconsistency: more than one active job, keeping the earliest accepted"
            );
            events.push(DriverEvent::DataInconsistency {
                kept: kept.clone(),
                ignored: ignored.clone(),
            });
        }
        self.inconsistency = current;
    }

    /// Lifecycle events implied by moving from the current view to `next`.
    fn diff(&mut self, next: &DriverView, events: &mut Vec<DriverEvent>) {
        let prev = Arc::clone(&self.view);

        match (&prev.active, &next.active) {
            (None, Some(now)) => events.push(DriverEvent::BecameActive(now.clone())),
            (Some(was), None) => events.push(DriverEvent::ActiveCleared {
                job_id: was.id.clone(),
            }),
            (Some(was), Some(now)) if was.id != now.id => {
                events.push(DriverEvent::ActiveCleared {
                    job_id: was.id.clone(),
                });
                events.push(DriverEvent::BecameActive(now.clone()));
            }
            (Some(was), Some(now)) if was.status != now.status => {
                events.push(DriverEvent::ActiveStatusChanged(now.clone()));
            }
            _ => {}
        }

        for job in next.active.iter().chain(next.pool.iter()) {
            self.seen_live.insert(job.id.clone());
        }
        for job in &next.history {
            if prev.history_job(&job.id).is_some() || !self.seen_live.remove(&job.id) {
                continue;
            }
            match job.status {
                JobStatus::Completed => events.push(DriverEvent::Completed(job.clone())),
                JobStatus::Cancelled => events.push(DriverEvent::Cancelled(job.clone())),
                JobStatus::Rejected => events.push(DriverEvent::Rejected(job.clone())),
                _ => {}
            }
        }
    }
}

/// Earliest `accepted_at` first; jobs without one sort last; ties by id.
fn active_order(a: &Job, b: &Job) -> Ordering {
    let by_time = match (a.accepted_at, b.accepted_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time.then_with(|| a.id.cmp(&b.id))
}

/// The timestamp history is ordered by, newest first.
fn history_time(job: &Job) -> DateTime<Utc> {
    let stamped = match job.status {
        JobStatus::Completed => job.completed_at,
        JobStatus::Rejected => job.rejected_at,
        JobStatus::Cancelled => job.cancelled_at,
        _ => None,
    };
    stamped.unwrap_or(job.scheduled_time)
}

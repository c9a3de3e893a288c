// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reconciled per-driver projection handed to presentation code.

use rideline_core::{Job, JobId, JobStatus};

/// A driver's merged view of job state.
///
/// Rebuilt by the reconciler on every merge and published as an
/// `Arc<DriverView>`; presentation code never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverView {
    /// The driver's accepted or in-progress job.
    pub active: Option<Job>,
    /// Jobs offered to the driver, earliest scheduled first.
    pub pool: Vec<Job>,
    /// Finished, cancelled and rejected jobs, most recent first.
    pub history: Vec<Job>,
}

/// Where a job sits in a [`DriverView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Active,
    Pool,
    History,
}

type Entry = (JobId, JobStatus, u64);

/// Identity of a view for change detection: ids, statuses and revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFingerprint {
    pub active: Option<Entry>,
    pub pool: Vec<Entry>,
    pub history: Vec<Entry>,
}

fn entry(job: &Job) -> Entry {
    (job.id.clone(), job.status, job.revision)
}

impl DriverView {
    pub fn fingerprint(&self) -> ViewFingerprint {
        ViewFingerprint {
            active: self.active.as_ref().map(entry),
            pool: self.pool.iter().map(entry).collect(),
            history: self.history.iter().map(entry).collect(),
        }
    }

    /// Locate a job anywhere in the view.
    pub fn find(&self, id: &JobId) -> Option<(Section, &Job)> {
        if let Some(active) = self.active.as_ref().filter(|job| &job.id == id) {
            return Some((Section::Active, active));
        }
        if let Some(job) = self.pool_job(id) {
            return Some((Section::Pool, job));
        }
        self.history_job(id).map(|job| (Section::History, job))
    }

    pub fn pool_job(&self, id: &JobId) -> Option<&Job> {
        self.pool.iter().find(|job| &job.id == id)
    }

    pub fn history_job(&self, id: &JobId) -> Option<&Job> {
        self.history.iter().find(|job| &job.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.pool.is_empty() && self.history.is_empty()
    }
}

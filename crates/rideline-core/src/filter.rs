// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change-feed filter predicates.
//!
//! A [`JobFilter`] is a conjunction of equality, membership and null-check
//! predicates over a job, plus an ordering and an optional limit applied to
//! the initial snapshot of a subscription. Later deltas are not windowed, so
//! live views should subscribe unlimited and truncate locally.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChangeKind, DriverId, Job, JobStatus};

/// Predicate on `assigned_driver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignee {
    /// `assigned_driver` is null.
    Unassigned,
    /// `assigned_driver` equals the given driver.
    Driver(DriverId),
}

/// Timestamp field a snapshot is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderBy {
    #[default]
    ScheduledTime,
    RejectedAt,
    CompletedAt,
    UpdatedAt,
}

impl OrderBy {
    fn key(self, job: &Job) -> Option<DateTime<Utc>> {
        match self {
            OrderBy::ScheduledTime => Some(job.scheduled_time),
            OrderBy::RejectedAt => job.rejected_at,
            OrderBy::CompletedAt => job.completed_at,
            OrderBy::UpdatedAt => Some(job.updated_at),
        }
    }
}

/// A subscription filter. All predicates that are set must hold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub statuses: Option<Vec<JobStatus>>,
    pub assignee: Option<Assignee>,
    pub rejected_by: Option<DriverId>,
    pub declined_by: Option<DriverId>,
    /// Excludes jobs the given driver has declined.
    pub not_declined_by: Option<DriverId>,
    pub order_by: OrderBy,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl JobFilter {
    /// Pending jobs nobody has been bound to yet (pull model pool).
    pub fn unassigned_pending() -> Self {
        Self {
            statuses: Some(vec![JobStatus::Pending]),
            assignee: Some(Assignee::Unassigned),
            ..Self::default()
        }
    }

    /// Unassigned pending jobs `driver` has not passed on.
    pub fn offered_to(driver: &DriverId) -> Self {
        Self {
            not_declined_by: Some(driver.clone()),
            ..Self::unassigned_pending()
        }
    }

    /// Pending jobs a dispatcher pre-assigned to `driver`.
    pub fn pre_assigned_pending(driver: &DriverId) -> Self {
        Self {
            statuses: Some(vec![JobStatus::Pending]),
            assignee: Some(Assignee::Driver(driver.clone())),
            ..Self::default()
        }
    }

    /// The driver's accepted or in-progress jobs.
    pub fn active_for(driver: &DriverId) -> Self {
        Self {
            statuses: Some(JobStatus::ACTIVE.to_vec()),
            assignee: Some(Assignee::Driver(driver.clone())),
            ..Self::default()
        }
    }

    /// The driver's completed and cancelled jobs, newest first.
    pub fn history_for(driver: &DriverId) -> Self {
        Self {
            statuses: Some(vec![JobStatus::Completed, JobStatus::Cancelled]),
            assignee: Some(Assignee::Driver(driver.clone())),
            order_by: OrderBy::ScheduledTime,
            descending: true,
            ..Self::default()
        }
    }

    /// Jobs the driver rejected terminally (pre-assigned model).
    pub fn rejected_by(driver: &DriverId) -> Self {
        Self {
            statuses: Some(vec![JobStatus::Rejected]),
            rejected_by: Some(driver.clone()),
            order_by: OrderBy::RejectedAt,
            descending: true,
            ..Self::default()
        }
    }

    /// Jobs the driver passed on (pull model), whatever happened to them since.
    pub fn declined_by(driver: &DriverId) -> Self {
        Self {
            declined_by: Some(driver.clone()),
            order_by: OrderBy::UpdatedAt,
            descending: true,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `job` satisfies every predicate.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(statuses) = &self.statuses
            && !statuses.contains(&job.status)
        {
            return false;
        }
        match &self.assignee {
            Some(Assignee::Unassigned) if job.assigned_driver.is_some() => return false,
            Some(Assignee::Driver(d)) if !job.is_assigned_to(d) => return false,
            _ => {}
        }
        if let Some(driver) = &self.rejected_by
            && job.rejected_by.as_ref() != Some(driver)
        {
            return false;
        }
        if let Some(driver) = &self.declined_by
            && !job.is_declined_by(driver)
        {
            return false;
        }
        if let Some(driver) = &self.not_declined_by
            && job.is_declined_by(driver)
        {
            return false;
        }
        true
    }

    /// Derive the notification a subscriber of this filter should see for a write.
    ///
    /// `before` is `None` for newly created jobs. Returns `None` when the job
    /// neither was nor is a member of the filter.
    pub fn classify(&self, before: Option<&Job>, after: &Job) -> Option<ChangeKind> {
        let was = before.is_some_and(|b| self.matches(b));
        let is = self.matches(after);
        match (was, is) {
            (false, true) => Some(ChangeKind::Added),
            (true, true) => Some(ChangeKind::Modified),
            (true, false) => Some(ChangeKind::Removed),
            (false, false) => None,
        }
    }

    /// Compare two jobs by this filter's ordering; ties break on id.
    pub fn compare(&self, a: &Job, b: &Job) -> Ordering {
        // Missing timestamps sort last regardless of direction.
        let ord = match (self.order_by.key(a), self.order_by.key(b)) {
            (Some(x), Some(y)) if self.descending => y.cmp(&x),
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ord.then_with(|| a.id.cmp(&b.id))
    }

    /// Filter, order and limit a set of jobs into a subscription snapshot.
    pub fn snapshot<'a>(&self, jobs: impl IntoIterator<Item = &'a Job>) -> Vec<Job> {
        let mut selected: Vec<Job> = jobs
            .into_iter()
            .filter(|job| self.matches(job))
            .cloned()
            .collect();
        selected.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decline, Fare, JobId, NewJob, RequesterId};
    use chrono::Duration;

    fn job(id: &str, status: JobStatus, driver: Option<&str>, offset_mins: i64) -> Job {
        let now = Utc::now();
        let mut job = Job::from_new(
            JobId::new(id),
            NewJob {
                requester: RequesterId::new("r-1"),
                requester_name: None,
                assigned_driver: driver.map(DriverId::new),
                origin: "A".into(),
                destination: "B".into(),
                waypoints: vec![],
                scheduled_time: now + Duration::minutes(offset_mins),
                fare: Fare::from_cents(1000),
                passengers: 1,
                bags: 0,
                distance: None,
                duration: None,
                after_hours: false,
                round_trip: false,
            },
            now,
        );
        job.status = status;
        job
    }

    #[test]
    fn unassigned_pending_excludes_pre_assigned() {
        let filter = JobFilter::unassigned_pending();
        assert!(filter.matches(&job("a", JobStatus::Pending, None, 0)));
        assert!(!filter.matches(&job("b", JobStatus::Pending, Some("d-1"), 0)));
        assert!(!filter.matches(&job("c", JobStatus::Accepted, None, 0)));
    }

    #[test]
    fn active_for_matches_only_that_driver() {
        let d1 = DriverId::new("d-1");
        let filter = JobFilter::active_for(&d1);
        assert!(filter.matches(&job("a", JobStatus::Accepted, Some("d-1"), 0)));
        assert!(filter.matches(&job("b", JobStatus::InProgress, Some("d-1"), 0)));
        assert!(!filter.matches(&job("c", JobStatus::Accepted, Some("d-2"), 0)));
        assert!(!filter.matches(&job("d", JobStatus::Completed, Some("d-1"), 0)));
    }

    #[test]
    fn declined_by_uses_membership() {
        let d1 = DriverId::new("d-1");
        let mut j = job("a", JobStatus::Pending, None, 0);
        let filter = JobFilter::declined_by(&d1);
        assert!(!filter.matches(&j));
        j.declines.push(Decline {
            driver: d1.clone(),
            at: Utc::now(),
        });
        assert!(filter.matches(&j));
    }

    #[test]
    fn offered_to_drops_jobs_once_declined() {
        let d1 = DriverId::new("d-1");
        let before = job("a", JobStatus::Pending, None, 0);
        let mut after = before.clone();
        after.declines.push(Decline {
            driver: d1.clone(),
            at: Utc::now(),
        });
        let offered = JobFilter::offered_to(&d1);
        assert!(offered.matches(&before));
        assert_eq!(offered.classify(Some(&before), &after), Some(ChangeKind::Removed));
        assert!(JobFilter::offered_to(&DriverId::new("d-2")).matches(&after));
        assert_eq!(offered.limit, None);
    }

    #[test]
    fn classify_reports_membership_transitions() {
        let d1 = DriverId::new("d-1");
        let pool = JobFilter::unassigned_pending();
        let active = JobFilter::active_for(&d1);
        let before = job("a", JobStatus::Pending, None, 0);
        let after = job("a", JobStatus::Accepted, Some("d-1"), 0);

        assert_eq!(pool.classify(None, &before), Some(ChangeKind::Added));
        assert_eq!(pool.classify(Some(&before), &before), Some(ChangeKind::Modified));
        assert_eq!(pool.classify(Some(&before), &after), Some(ChangeKind::Removed));
        assert_eq!(active.classify(Some(&before), &after), Some(ChangeKind::Added));
        assert_eq!(active.classify(None, &before), None);
    }

    #[test]
    fn snapshot_orders_and_limits() {
        let jobs = vec![
            job("late", JobStatus::Pending, None, 30),
            job("early", JobStatus::Pending, None, 5),
            job("mid", JobStatus::Pending, None, 10),
            job("taken", JobStatus::Accepted, Some("d-1"), 1),
        ];
        let snap = JobFilter::unassigned_pending().with_limit(2).snapshot(&jobs);
        let ids: Vec<&str> = snap.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid"]);
    }

    #[test]
    fn descending_order_puts_missing_keys_last() {
        let mut a = job("a", JobStatus::Rejected, None, 0);
        let b = job("b", JobStatus::Rejected, None, 0);
        a.rejected_at = Some(Utc::now());
        let filter = JobFilter {
            order_by: OrderBy::RejectedAt,
            descending: true,
            ..JobFilter::default()
        };
        assert_eq!(filter.compare(&a, &b), Ordering::Less);
    }
}

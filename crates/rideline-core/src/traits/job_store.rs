// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job store trait: filtered change feeds plus conditional point writes.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::RidelineError;
use crate::filter::JobFilter;
use crate::traits::adapter::PluginAdapter;
use crate::transition::Transition;
use crate::types::{FeedItem, Job, JobId, JobStatus, NewJob};

/// A live subscription. The first item is always a [`FeedItem::Snapshot`].
///
/// An `Err` item means the connection was lost; the stream ends after it and
/// the caller is expected to resubscribe.
pub type JobStream = Pin<Box<dyn Stream<Item = Result<FeedItem, RidelineError>> + Send>>;

/// Backend holding the `jobs` collection.
#[async_trait]
pub trait JobStore: PluginAdapter {
    /// Store a new job in `pending` and return it with its assigned id.
    async fn create_job(&self, new: NewJob) -> Result<Job, RidelineError>;

    /// Point read of a single job.
    async fn get_job(&self, id: &JobId) -> Result<Job, RidelineError>;

    /// Open a change feed for all jobs matching `filter`.
    async fn subscribe(&self, filter: JobFilter) -> Result<JobStream, RidelineError>;

    /// Conditionally apply `transition` to a job.
    ///
    /// The write is refused with [`RidelineError::Conflict`] (carrying the
    /// stored record) when the stored status no longer equals `expected`.
    /// Guards enforced by [`Transition::apply`] and the single-active-job
    /// rule surface as [`RidelineError::PreconditionFailed`]. A transition
    /// that is already reflected returns the stored record unchanged.
    async fn write(
        &self,
        id: &JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Job, RidelineError>;
}

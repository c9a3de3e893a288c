// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change feeds over the `job_changes` log.
//!
//! A subscription reads its snapshot and the log head in one read
//! transaction, then tails the log from that head. Tailing wakes on the
//! in-process change notifier or, for writes made by other processes, on
//! the poll interval.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream;
use rideline_core::{FeedItem, JobFilter, JobStream, RidelineError, SnapshotEvent};
use tracing::{debug, warn};

use crate::database::{Database, map_feed_err};
use crate::queries::{changes, jobs};

/// Maximum number of log rows read per poll.
const BATCH: usize = 256;

struct Tail {
    db: Database,
    filter: JobFilter,
    poll_interval: Duration,
    cursor: i64,
    pending: VecDeque<FeedItem>,
    ended: bool,
}

impl Tail {
    /// Read the next batch of log rows, or wait for a write if there are none.
    async fn advance(&mut self) -> Result<(), RidelineError> {
        let notify = self.db.changes().clone();
        let notified = notify.notified();
        tokio::pin!(notified);
        // Register before reading so a commit between the read and the wait is not missed.
        notified.as_mut().enable();

        let cursor = self.cursor;
        let batch = self
            .db
            .connection()
            .call(move |conn| changes::after(conn, cursor, BATCH))
            .await
            .map_err(map_feed_err)?;

        if batch.is_empty() {
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            return Ok(());
        }

        for record in batch {
            self.cursor = record.seq;
            if let Some(kind) = self.filter.classify(record.before.as_ref(), &record.after) {
                self.pending.push_back(FeedItem::Change(SnapshotEvent {
                    kind,
                    job: record.after,
                }));
            }
        }
        Ok(())
    }
}

/// Open a change feed for `filter`.
pub(crate) async fn subscribe(
    db: Database,
    filter: JobFilter,
    poll_interval: Duration,
) -> Result<JobStream, RidelineError> {
    let snapshot_filter = filter.clone();
    let (snapshot, head) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let snapshot = jobs::select_matching(&tx, &snapshot_filter)?;
            let head = changes::head(&tx)?;
            tx.commit()?;
            Ok((snapshot, head))
        })
        .await
        .map_err(map_feed_err)?;

    debug!(head, jobs = snapshot.len(), "change feed opened");

    let tail = Tail {
        db,
        filter,
        poll_interval,
        cursor: head,
        pending: VecDeque::from([FeedItem::Snapshot(snapshot)]),
        ended: false,
    };

    Ok(Box::pin(stream::unfold(tail, |mut tail| async move {
        loop {
            if tail.ended {
                return None;
            }
            if let Some(item) = tail.pending.pop_front() {
                return Some((Ok(item), tail));
            }
            if let Err(err) = tail.advance().await {
                warn!(error = %err, cursor = tail.cursor, "change feed failed");
                tail.ended = true;
                return Some((Err(err), tail));
            }
        }
    })))
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription pumps that funnel a driver's change feeds into one queue.
//!
//! Each stream gets a background task that subscribes, forwards every feed
//! item to the session's ordered inbound queue, and on failure reports the
//! stream as degraded, backs off with jitter and resubscribes. The engine
//! task is the queue's only consumer, so merge logic never runs
//! concurrently for one driver.

use std::time::Duration;

use futures::StreamExt;
use rideline_config::model::{AssignmentMode, ReconnectConfig, ViewConfig};
use rideline_core::{DriverId, FeedItem, Job};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::gateway::JobGateway;
use crate::reconcile::StreamKind;
use crate::recording;

/// Messages consumed by a session's engine task, in arrival order.
#[derive(Debug)]
pub(crate) enum Inbound {
    Feed {
        stream: StreamKind,
        item: FeedItem,
    },
    StreamFailed {
        stream: StreamKind,
        error: String,
    },
    /// A successful write result; `applied` fires once the view reflects it.
    Optimistic {
        job: Job,
        applied: oneshot::Sender<()>,
    },
}

/// Everything a pump needs to (re)open one stream.
#[derive(Clone)]
pub(crate) struct PumpSettings {
    pub gateway: JobGateway,
    pub driver: DriverId,
    pub mode: AssignmentMode,
    pub view: ViewConfig,
    pub reconnect: ReconnectConfig,
}

/// Spawn one pump task per stream. Tasks stop when `cancel` fires or the
/// inbound queue closes.
pub(crate) fn spawn_pumps(
    settings: &PumpSettings,
    tx: &mpsc::Sender<Inbound>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    StreamKind::ALL
        .into_iter()
        .map(|stream| {
            let settings = settings.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pump(stream, settings, tx, cancel).await })
        })
        .collect()
}

async fn pump(
    stream: StreamKind,
    settings: PumpSettings,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(
        Duration::from_millis(settings.reconnect.initial_backoff_ms),
        Duration::from_millis(settings.reconnect.max_backoff_ms),
    );
    let mut failures: u32 = 0;

    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = settings.gateway.subscribe_stream(
                stream,
                &settings.driver,
                settings.mode,
                &settings.view,
            ) => opened,
        };

        let error = match opened {
            Ok(mut feed) => {
                debug!(driver_id = %settings.driver, stream = %stream, failures, "stream subscribed");
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = feed.next() => next,
                    };
                    match next {
                        Some(Ok(item)) => {
                            if matches!(item, FeedItem::Snapshot(_)) {
                                backoff.reset();
                                failures = 0;
                            }
                            if tx.send(Inbound::Feed { stream, item }).await.is_err() {
                                // Session engine is gone.
                                return;
                            }
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "change feed ended".to_string(),
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        failures += 1;
        let delay = backoff.next_delay();
        warn!(
            driver_id = %settings.driver,
            stream = %stream,
            attempt = failures,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "stream failed, resubscribing after backoff"
        );
        if tx
            .send(Inbound::StreamFailed { stream, error })
            .await
            .is_err()
        {
            return;
        }
        recording::record_resubscribe(stream);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rideline seed` and the single-operation commands.
//!
//! Each operation starts a driver session, waits for the initial sync so
//! preconditions are checked against a complete view, runs one guarded
//! operation and tears the session down again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rideline_config::RidelineConfig;
use rideline_core::{Fare, Identity, Job, JobId, NewJob, RequesterId, RidelineError};
use rideline_engine::{DriverSession, JobGateway, TransitionOutcome};
use rideline_store::SqliteStore;
use tracing::info;

/// Upper bound on the initial sync before an operation gives up.
const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Minutes between the scheduled times of seeded jobs.
const SEED_SPACING_MINS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Accept,
    Reject,
    Start,
    Complete,
    Cancel,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Accept => "accept",
            Op::Reject => "reject",
            Op::Start => "start",
            Op::Complete => "complete",
            Op::Cancel => "cancel",
        }
    }
}

pub async fn open_gateway(config: &RidelineConfig) -> Result<JobGateway, RidelineError> {
    let store = SqliteStore::open(config.storage.clone()).await?;
    Ok(JobGateway::from_store(Arc::new(store)))
}

/// Create `count` pending jobs, printing one id per line.
pub async fn run_seed(
    config: &RidelineConfig,
    count: usize,
    requester: &str,
    driver: Option<&str>,
    start_in: i64,
) -> Result<(), RidelineError> {
    let gateway = open_gateway(config).await?;
    let mut scheduled = Utc::now() + chrono::Duration::minutes(start_in);
    for i in 0..count {
        let job = gateway
            .create_job(NewJob {
                requester: RequesterId::new(requester),
                requester_name: None,
                assigned_driver: driver.map(Into::into),
                origin: format!("Pickup {}", i + 1),
                destination: format!("Dropoff {}", i + 1),
                waypoints: vec![],
                scheduled_time: scheduled,
                fare: Fare::from_cents(1500 + 250 * (i % 8) as i64),
                passengers: 1,
                bags: 0,
                distance: None,
                duration: None,
                after_hours: false,
                round_trip: false,
            })
            .await?;
        println!("{}", job.id);
        scheduled += chrono::Duration::minutes(SEED_SPACING_MINS);
    }
    info!(count, requester, "jobs seeded");
    Ok(())
}

/// Run one lifecycle operation as `driver`.
pub async fn run_operation(
    config: &RidelineConfig,
    op: Op,
    driver: &str,
    job_id: &str,
) -> Result<(), RidelineError> {
    let gateway = open_gateway(config).await?;
    let session = DriverSession::start(gateway, &Identity::new(driver), config).await?;
    let result = perform(&session, op, &JobId::new(job_id)).await;
    session.shutdown().await;

    let outcome = result?;
    let verdict = if outcome.was_applied() {
        "applied"
    } else {
        "already applied"
    };
    println!("{} {}: {verdict}", op.as_str(), describe(outcome.job()));
    Ok(())
}

async fn perform(
    session: &DriverSession,
    op: Op,
    job_id: &JobId,
) -> Result<TransitionOutcome, RidelineError> {
    tokio::time::timeout(SYNC_TIMEOUT, session.wait_until_synced())
        .await
        .map_err(|_| RidelineError::transport("timed out waiting for the initial sync"))??;
    let controller = session.controller();
    match op {
        Op::Accept => controller.accept(job_id).await,
        Op::Reject => controller.reject(job_id).await,
        Op::Start => controller.start(job_id).await,
        Op::Complete => controller.complete(job_id).await,
        Op::Cancel => controller.cancel(job_id).await,
    }
}

/// Cancel a job on behalf of its requester.
pub async fn run_requester_cancel(
    config: &RidelineConfig,
    requester: &str,
    job_id: &str,
) -> Result<(), RidelineError> {
    let gateway = open_gateway(config).await?;
    let job = gateway
        .cancel_as_requester(&JobId::new(job_id), &RequesterId::new(requester))
        .await?;
    println!("cancel {}: applied", describe(&job));
    Ok(())
}

/// One-line summary of a job.
pub fn describe(job: &Job) -> String {
    format!(
        "{} [{}] {} -> {} at {} {} (rev {})",
        job.id,
        job.status,
        job.origin,
        job.destination,
        job.scheduled_time.format("%Y-%m-%d %H:%M"),
        job.fare,
        job.revision
    )
}

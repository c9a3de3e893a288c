// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rideline watch` command implementation.
//!
//! Runs a driver session in the foreground and prints the view and each
//! lifecycle event until SIGINT or SIGTERM.

use std::time::Duration;

use rideline_config::RidelineConfig;
use rideline_core::{Identity, RidelineError};
use rideline_engine::{
    DriverEvent, DriverSession, DriverView, drain_session, install_signal_handler,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::jobs::{describe, open_gateway};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_watch(config: &RidelineConfig, driver: &str) -> Result<(), RidelineError> {
    let cancel = install_signal_handler();
    let gateway = open_gateway(config).await?;
    let session = DriverSession::start(gateway, &Identity::new(driver), config).await?;
    let controller = session.controller();
    let mut events = controller.subscribe_events();

    tokio::select! {
        _ = cancel.cancelled() => {
            drain_session(session, DRAIN_TIMEOUT).await;
            return Ok(());
        }
        synced = controller.wait_until_synced() => synced?,
    }
    println!("watching driver {driver} ({} mode)", controller.mode());
    print_view(&controller.view());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    println!("event: {}", render_event(&event));
                    if matches!(
                        event,
                        DriverEvent::PoolUpdated { .. } | DriverEvent::HistoryUpdated { .. }
                    ) {
                        continue;
                    }
                    print_view(&controller.view());
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event printer fell behind");
                    print_view(&controller.view());
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    drain_session(session, DRAIN_TIMEOUT).await;
    Ok(())
}

fn render_event(event: &DriverEvent) -> String {
    match event {
        DriverEvent::BecameActive(job)
        | DriverEvent::ActiveStatusChanged(job)
        | DriverEvent::Completed(job)
        | DriverEvent::Cancelled(job)
        | DriverEvent::Rejected(job) => format!("{} {}", event.name(), describe(job)),
        DriverEvent::ActiveCleared { job_id } => format!("{} {job_id}", event.name()),
        DriverEvent::PoolUpdated { size } | DriverEvent::HistoryUpdated { size } => {
            format!("{} size={size}", event.name())
        }
        DriverEvent::ConnectivityChanged(connectivity) => {
            format!("{} {connectivity}", event.name())
        }
        DriverEvent::DataInconsistency { kept, ignored } => {
            let ignored: Vec<&str> = ignored.iter().map(|id| id.as_str()).collect();
            format!("{} kept={kept} ignored={}", event.name(), ignored.join(","))
        }
    }
}

fn print_view(view: &DriverView) {
    match &view.active {
        Some(job) => println!("active: {}", describe(job)),
        None => println!("active: none"),
    }
    println!("pool ({}):", view.pool.len());
    for job in &view.pool {
        println!("  {}", describe(job));
    }
    println!("history ({}):", view.history.len());
    for job in &view.history {
        println!("  {}", describe(job));
    }
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for jobs, transitions and configs used across test suites.

use chrono::{Duration, Utc};
use rideline_config::RidelineConfig;
use rideline_config::model::AssignmentMode;
use rideline_core::{
    DriverId, DriverSnapshot, Fare, Identity, NewJob, RequesterId, Transition,
};

/// Requester used by [`new_job`].
pub const REQUESTER: &str = "r-1";

/// A pull-model job scheduled `minutes` from now.
pub fn new_job(minutes: i64) -> NewJob {
    NewJob {
        requester: RequesterId::new(REQUESTER),
        requester_name: Some("Rita".into()),
        assigned_driver: None,
        origin: "Central Station".into(),
        destination: "Airport T2".into(),
        waypoints: vec![],
        scheduled_time: Utc::now() + Duration::minutes(minutes),
        fare: Fare::from_cents(3200),
        passengers: 1,
        bags: 1,
        distance: Some("18 km".into()),
        duration: Some("25 min".into()),
        after_hours: false,
        round_trip: false,
    }
}

/// A job a dispatcher pre-assigned to `driver`.
pub fn pre_assigned_job(minutes: i64, driver: &str) -> NewJob {
    NewJob {
        assigned_driver: Some(DriverId::new(driver)),
        ..new_job(minutes)
    }
}

pub fn identity(driver: &str, name: &str) -> Identity {
    Identity {
        display_name: Some(name.to_string()),
        ..Identity::new(driver)
    }
}

pub fn accept(driver: &str) -> Transition {
    Transition::Accept {
        driver: DriverId::new(driver),
        snapshot: DriverSnapshot {
            name: "Dee".into(),
            vehicle_model: "Corolla".into(),
            license_plate: "ABC-123".into(),
        },
    }
}

/// Config with short backoffs so reconnect tests run fast.
pub fn fast_config(mode: AssignmentMode) -> RidelineConfig {
    let mut config = RidelineConfig::default();
    config.assignment.mode = mode;
    config.reconnect.initial_backoff_ms = 10;
    config.reconnect.max_backoff_ms = 50;
    config.writes.retry_backoff_ms = 5;
    config.storage.feed_poll_interval_ms = 20;
    config
}

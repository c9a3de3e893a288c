// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics facade; without an installed recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

use crate::reconcile::StreamKind;

/// Register all Rideline metric descriptions.
///
/// Call once at startup after a recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "rideline_feed_events_total",
        "Change-feed items applied, by stream"
    );
    describe_counter!(
        "rideline_conflicts_total",
        "Conditional writes refused because the job moved"
    );
    describe_counter!(
        "rideline_data_inconsistencies_total",
        "Times more than one active job was observed for a driver"
    );
    describe_counter!(
        "rideline_resubscribes_total",
        "Change-feed resubscriptions after a stream error, by stream"
    );
    describe_counter!(
        "rideline_transitions_total",
        "Lifecycle operations by transition and outcome"
    );
    describe_gauge!("rideline_pool_size", "Jobs in the driver's pending pool");
    describe_gauge!("rideline_history_size", "Jobs in the driver's history");
    describe_histogram!(
        "rideline_write_latency_seconds",
        "Conditional write latency in seconds, retries included"
    );
}

pub fn record_feed_event(stream: StreamKind) {
    metrics::counter!("rideline_feed_events_total", "stream" => stream.as_str()).increment(1);
}

pub fn record_conflict(transition: &'static str) {
    metrics::counter!("rideline_conflicts_total", "transition" => transition).increment(1);
}

pub fn record_data_inconsistency() {
    metrics::counter!("rideline_data_inconsistencies_total").increment(1);
}

pub fn record_resubscribe(stream: StreamKind) {
    metrics::counter!("rideline_resubscribes_total", "stream" => stream.as_str()).increment(1);
}

/// Record a lifecycle operation. `outcome` is `applied`, `already_applied` or `failed`.
pub fn record_transition(transition: &'static str, outcome: &'static str) {
    metrics::counter!(
        "rideline_transitions_total",
        "transition" => transition,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn set_view_sizes(pool: usize, history: usize) {
    metrics::gauge!("rideline_pool_size").set(pool as f64);
    metrics::gauge!("rideline_history_size").set(history as f64);
}

pub fn record_write_latency(seconds: f64) {
    metrics::histogram!("rideline_write_latency_seconds").record(seconds);
}

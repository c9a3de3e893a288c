// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row-level types for storage entities.
//!
//! Jobs are persisted as a JSON `body` alongside denormalized columns used
//! for filtering. The canonical domain types live in `rideline-core`.

use chrono::{DateTime, Utc};
use rideline_core::{DriverId, DriverProfile, Job};

use crate::database::{decode_err, encode_err};

/// One row of the `job_changes` log.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub seq: i64,
    /// State before the write; `None` for job creation.
    pub before: Option<Job>,
    pub after: Job,
}

pub(crate) fn encode_job(job: &Job) -> Result<String, rusqlite::Error> {
    serde_json::to_string(job).map_err(encode_err)
}

pub(crate) fn decode_job(idx: usize, body: &str) -> Result<Job, rusqlite::Error> {
    serde_json::from_str(body).map_err(|e| decode_err(idx, e))
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| decode_err(idx, e))
}

/// Column list matching [`profile_from_row`].
pub(crate) const PROFILE_COLUMNS: &str =
    "id, display_name, email, vehicle_model, license_plate, created_at, last_updated_at";

pub(crate) fn profile_from_row(row: &rusqlite::Row<'_>) -> Result<DriverProfile, rusqlite::Error> {
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;
    Ok(DriverProfile {
        id: DriverId::new(row.get::<_, String>(0)?),
        display_name: row.get(1)?,
        email: row.get(2)?,
        vehicle_model: row.get(3)?,
        license_plate: row.get(4)?,
        created_at: parse_ts(5, &created)?,
        last_updated_at: parse_ts(6, &updated)?,
    })
}

// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append and tail operations on the `job_changes` log.
//!
//! These helpers run inside a `conn.call` closure so that a write and its
//! log row share one transaction.

use rideline_core::Job;
use rusqlite::{Connection, params};

use crate::models::{ChangeRecord, decode_job, encode_job};

/// Append a change row for `after`, with the previous state if any.
pub fn append(conn: &Connection, before: Option<&Job>, after: &Job) -> Result<i64, rusqlite::Error> {
    let before = before.map(encode_job).transpose()?;
    conn.execute(
        "INSERT INTO job_changes (job_id, before, after) VALUES (?1, ?2, ?3)",
        params![after.id.as_str(), before, encode_job(after)?],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Highest sequence number in the log, or 0 when empty.
pub fn head(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM job_changes", [], |row| {
        row.get(0)
    })
}

/// Up to `limit` changes with `seq > cursor`, oldest first.
pub fn after(conn: &Connection, cursor: i64, limit: usize) -> Result<Vec<ChangeRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "SELECT seq, before, after FROM job_changes WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![cursor, limit as i64], |row| {
        let before: Option<String> = row.get(1)?;
        let after: String = row.get(2)?;
        Ok(ChangeRecord {
            seq: row.get(0)?,
            before: before.as_deref().map(|b| decode_job(1, b)).transpose()?,
            after: decode_job(2, &after)?,
        })
    })?;
    rows.collect()
}

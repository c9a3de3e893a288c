// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job creation, point reads, filtered snapshots and conditional writes.

use chrono::Utc;
use rideline_core::{
    Assignee, DriverId, Job, JobFilter, JobId, JobStatus, NewJob, Precondition, RidelineError,
    Transition,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use tracing::debug;

use crate::database::{Database, map_tr_err};
use crate::models::{decode_job, encode_job, format_ts};
use crate::queries::changes;

/// Result of a conditional write, decided inside the write transaction.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The transition was applied and logged.
    Applied(Job),
    /// The transition was already reflected; nothing was written.
    Unchanged(Job),
    /// The stored status differs from the expected one.
    Conflict(Job),
    /// `Transition::apply` refused the write.
    Refused(RidelineError),
    /// The driver already holds another active job.
    ActiveViolation(JobId),
    NotFound,
}

impl WriteOutcome {
    /// Fold the outcome into the `JobStore::write` contract.
    pub fn into_result(self, id: &JobId, expected: JobStatus) -> Result<Job, RidelineError> {
        match self {
            WriteOutcome::Applied(job) | WriteOutcome::Unchanged(job) => Ok(job),
            WriteOutcome::Conflict(current) => Err(RidelineError::Conflict {
                job_id: id.clone(),
                expected,
                current: Box::new(current),
            }),
            WriteOutcome::Refused(err) => Err(err),
            WriteOutcome::ActiveViolation(active) => Err(RidelineError::precondition(
                id,
                Precondition::AlreadyHasActiveJob { active },
            )),
            WriteOutcome::NotFound => Err(RidelineError::NotFound {
                kind: "job",
                id: id.to_string(),
            }),
        }
    }
}

fn load(conn: &Connection, id: &str) -> Result<Option<Job>, rusqlite::Error> {
    conn.query_row("SELECT body FROM jobs WHERE id = ?1", params![id], |row| {
        row.get::<_, String>(0)
    })
    .optional()?
    .map(|body| decode_job(0, &body))
    .transpose()
}

fn active_job_of(
    conn: &Connection,
    driver: &DriverId,
    except: &JobId,
) -> Result<Option<JobId>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM jobs
         WHERE assigned_driver = ?1 AND status IN ('accepted', 'in_progress') AND id != ?2
         LIMIT 1",
        params![driver.as_str(), except.as_str()],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map(|id| id.map(JobId::new))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Select every job matching `filter`, ordered and limited as a snapshot.
///
/// Column predicates narrow the scan in SQL; `JobFilter::matches` remains
/// the authority on membership.
pub fn select_matching(conn: &Connection, filter: &JobFilter) -> Result<Vec<Job>, rusqlite::Error> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<String> = Vec::new();

    if let Some(statuses) = &filter.statuses {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let marks = vec!["?"; statuses.len()].join(", ");
        clauses.push(format!("status IN ({marks})"));
        args.extend(statuses.iter().map(|s| s.to_string()));
    }
    match &filter.assignee {
        Some(Assignee::Unassigned) => clauses.push("assigned_driver IS NULL".to_string()),
        Some(Assignee::Driver(driver)) => {
            clauses.push("assigned_driver = ?".to_string());
            args.push(driver.to_string());
        }
        None => {}
    }
    if let Some(driver) = &filter.rejected_by {
        clauses.push("rejected_by = ?".to_string());
        args.push(driver.to_string());
    }
    if let Some(driver) = &filter.declined_by {
        clauses.push(
            "EXISTS (SELECT 1 FROM json_each(jobs.body, '$.declines') d
                     WHERE json_extract(d.value, '$.driver') = ?)"
                .to_string(),
        );
        args.push(driver.to_string());
    }
    if let Some(driver) = &filter.not_declined_by {
        clauses.push(
            "NOT EXISTS (SELECT 1 FROM json_each(jobs.body, '$.declines') d
                         WHERE json_extract(d.value, '$.driver') = ?)"
                .to_string(),
        );
        args.push(driver.to_string());
    }

    let mut sql = "SELECT body FROM jobs".to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let mut stmt = conn.prepare(&sql)?;
    let jobs = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            let body: String = row.get(0)?;
            decode_job(0, &body)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(filter.snapshot(&jobs))
}

/// Insert a new pending job and log its creation.
pub async fn insert_job(db: &Database, new: NewJob) -> Result<Job, RidelineError> {
    let job = db
        .connection()
        .call(move |conn| {
            let job = Job::from_new(JobId::generate(), new, Utc::now());
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO jobs (id, status, revision, requester, assigned_driver, rejected_by,
                                   scheduled_time, updated_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8)",
                params![
                    job.id.as_str(),
                    job.status.as_ref(),
                    job.revision as i64,
                    job.requester.as_str(),
                    job.assigned_driver.as_ref().map(|d| d.as_str()),
                    format_ts(job.scheduled_time),
                    format_ts(job.updated_at),
                    encode_job(&job)?,
                ],
            )?;
            changes::append(&tx, None, &job)?;
            tx.commit()?;
            Ok(job)
        })
        .await
        .map_err(map_tr_err)?;
    db.notify_changed();
    debug!(job_id = %job.id, "job created");
    Ok(job)
}

/// Get a job by ID.
pub async fn get_job(db: &Database, id: &JobId) -> Result<Option<Job>, RidelineError> {
    let id = id.clone();
    db.connection()
        .call(move |conn| load(conn, id.as_str()))
        .await
        .map_err(map_tr_err)
}

/// Conditionally apply `transition` to job `id`.
///
/// Runs in an IMMEDIATE transaction so the status check, the single-active
/// check and the update are atomic with respect to other processes. The
/// partial unique index on active jobs backs up the explicit check.
pub async fn write_job(
    db: &Database,
    id: &JobId,
    expected: JobStatus,
    transition: Transition,
) -> Result<WriteOutcome, RidelineError> {
    let id = id.clone();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(current) = load(&tx, id.as_str())? else {
                return Ok(WriteOutcome::NotFound);
            };
            if current.status != expected {
                return Ok(WriteOutcome::Conflict(current));
            }
            let next = match transition.apply(&current, Utc::now()) {
                Ok(Some(next)) => next,
                Ok(None) => return Ok(WriteOutcome::Unchanged(current)),
                Err(err) => return Ok(WriteOutcome::Refused(err)),
            };

            if next.status.is_active()
                && !current.status.is_active()
                && let Some(driver) = &next.assigned_driver
                && let Some(active) = active_job_of(&tx, driver, &next.id)?
            {
                return Ok(WriteOutcome::ActiveViolation(active));
            }

            let updated = tx.execute(
                "UPDATE jobs
                 SET status = ?1, revision = ?2, assigned_driver = ?3, rejected_by = ?4,
                     updated_at = ?5, body = ?6
                 WHERE id = ?7 AND status = ?8 AND revision = ?9",
                params![
                    next.status.as_ref(),
                    next.revision as i64,
                    next.assigned_driver.as_ref().map(|d| d.as_str()),
                    next.rejected_by.as_ref().map(|d| d.as_str()),
                    format_ts(next.updated_at),
                    encode_job(&next)?,
                    next.id.as_str(),
                    current.status.as_ref(),
                    current.revision as i64,
                ],
            );
            match updated {
                Ok(1) => {}
                Ok(_) => return Ok(WriteOutcome::Conflict(current)),
                Err(err) if is_constraint_violation(&err) => {
                    // Another process won the race past the explicit check.
                    if let Some(driver) = &next.assigned_driver
                        && let Some(active) = active_job_of(&tx, driver, &next.id)?
                    {
                        return Ok(WriteOutcome::ActiveViolation(active));
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }

            changes::append(&tx, Some(&current), &next)?;
            tx.commit()?;
            Ok(WriteOutcome::Applied(next))
        })
        .await
        .map_err(map_tr_err)?;

    if let WriteOutcome::Applied(job) = &outcome {
        db.notify_changed();
        debug!(job_id = %job.id, status = %job.status, revision = job.revision, "job written");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rideline_core::{DriverSnapshot, Fare, RequesterId};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("jobs.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_job(offset_mins: i64, driver: Option<&str>) -> NewJob {
        NewJob {
            requester: RequesterId::new("r-1"),
            requester_name: Some("Rita".into()),
            assigned_driver: driver.map(DriverId::new),
            origin: "Airport".into(),
            destination: "Harbor".into(),
            waypoints: vec!["Depot".into()],
            scheduled_time: Utc::now() + Duration::minutes(offset_mins),
            fare: Fare::from_cents(4200),
            passengers: 2,
            bags: 1,
            distance: Some("12 km".into()),
            duration: Some("18 min".into()),
            after_hours: false,
            round_trip: false,
        }
    }

    fn accept(driver: &str) -> Transition {
        Transition::Accept {
            driver: DriverId::new(driver),
            snapshot: DriverSnapshot {
                name: "Dee".into(),
                vehicle_model: "Corolla".into(),
                license_plate: "ABC-123".into(),
            },
        }
    }

    #[tokio::test]
    async fn insert_and_get_job_roundtrips() {
        let (db, _dir) = setup_db().await;
        let job = insert_job(&db, new_job(30, None)).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.revision, 1);

        let loaded = get_job(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(get_job(&db, &JobId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_applies_and_bumps_revision() {
        let (db, _dir) = setup_db().await;
        let job = insert_job(&db, new_job(30, None)).await.unwrap();
        let outcome = write_job(&db, &job.id, JobStatus::Pending, accept("d-1"))
            .await
            .unwrap();
        let written = outcome.into_result(&job.id, JobStatus::Pending).unwrap();
        assert_eq!(written.status, JobStatus::Accepted);
        assert_eq!(written.revision, 2);
        assert_eq!(get_job(&db, &job.id).await.unwrap().unwrap(), written);
    }

    #[tokio::test]
    async fn stale_expectation_conflicts_with_current_record() {
        let (db, _dir) = setup_db().await;
        let job = insert_job(&db, new_job(30, None)).await.unwrap();
        write_job(&db, &job.id, JobStatus::Pending, accept("d-1"))
            .await
            .unwrap();

        let outcome = write_job(&db, &job.id, JobStatus::Pending, accept("d-2"))
            .await
            .unwrap();
        match outcome {
            WriteOutcome::Conflict(current) => {
                assert_eq!(current.assigned_driver, Some(DriverId::new("d-1")));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_active_job_is_refused() {
        let (db, _dir) = setup_db().await;
        let first = insert_job(&db, new_job(30, None)).await.unwrap();
        let second = insert_job(&db, new_job(60, None)).await.unwrap();
        write_job(&db, &first.id, JobStatus::Pending, accept("d-1"))
            .await
            .unwrap();

        let outcome = write_job(&db, &second.id, JobStatus::Pending, accept("d-1"))
            .await
            .unwrap();
        match outcome {
            WriteOutcome::ActiveViolation(active) => assert_eq!(active, first.id),
            other => panic!("expected active violation, got {other:?}"),
        }
        let untouched = get_job(&db, &second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn select_matching_filters_orders_and_limits() {
        let (db, _dir) = setup_db().await;
        let late = insert_job(&db, new_job(90, None)).await.unwrap();
        let early = insert_job(&db, new_job(10, None)).await.unwrap();
        let _pre = insert_job(&db, new_job(5, Some("d-9"))).await.unwrap();
        let declined = insert_job(&db, new_job(20, None)).await.unwrap();
        write_job(
            &db,
            &declined.id,
            JobStatus::Pending,
            Transition::Decline {
                driver: DriverId::new("d-1"),
            },
        )
        .await
        .unwrap();

        let pool = db
            .connection()
            .call(|conn| select_matching(conn, &JobFilter::unassigned_pending().with_limit(2)))
            .await
            .unwrap();
        let ids: Vec<JobId> = pool.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![early.id.clone(), declined.id.clone()]);

        let mine = db
            .connection()
            .call(|conn| select_matching(conn, &JobFilter::declined_by(&DriverId::new("d-1"))))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, declined.id);
        assert_ne!(mine[0].id, late.id);

        let offered = db
            .connection()
            .call(|conn| select_matching(conn, &JobFilter::offered_to(&DriverId::new("d-1"))))
            .await
            .unwrap();
        let ids: Vec<JobId> = offered.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }
}

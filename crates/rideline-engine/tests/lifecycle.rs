// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end lifecycle tests: driver sessions over the mock and SQLite stores.

use std::sync::Arc;
use std::time::Duration;

use rideline_config::model::AssignmentMode;
use rideline_core::{
    Actor, DriverId, JobStatus, Precondition, ProfilePatch, RequesterId, RidelineError,
};
use rideline_engine::{
    Connectivity, DriverEvent, SessionState, SessionSupervisor, TransitionOutcome,
};
use rideline_test_utils::fixtures;
use rideline_test_utils::harness::{WAIT, wait_for_event, wait_for_view};
use rideline_test_utils::{MockIdentity, TestHarness};
use tokio_util::sync::CancellationToken;

fn is_precondition(err: &RidelineError, expected: &Precondition) -> bool {
    matches!(err, RidelineError::PreconditionFailed { reason, .. } if reason == expected)
}

#[tokio::test]
async fn pool_is_ordered_by_scheduled_time() {
    let h = TestHarness::new().await;
    let late = h.seed(90).await;
    let soon = h.seed(15).await;
    let mid = h.seed(45).await;

    let session = h.session("d-1").await;
    let view = session.controller().view();
    let ids: Vec<_> = view.pool.iter().map(|j| j.id.clone()).collect();
    assert_eq!(ids, vec![soon.id, mid.id, late.id]);
    assert!(view.active.is_none());
    assert!(view.history.is_empty());
    assert_eq!(session.state(), SessionState::Live);
    session.shutdown().await;
}

#[tokio::test]
async fn pool_window_refills_as_other_drivers_take_jobs() {
    let mut h = TestHarness::new().await;
    h.config.view.pool_limit = 2;
    let a = h.seed(10).await;
    let b = h.seed(20).await;
    let c = h.seed(30).await;

    let session = h.session("d-1").await;
    let controller = session.controller();
    let ids: Vec<_> = controller.view().pool.iter().map(|j| j.id.clone()).collect();
    assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);

    let d2 = h.session("d-2").await;
    let d3 = h.session("d-3").await;
    d2.controller().accept(&a.id).await.unwrap();
    d3.controller().accept(&b.id).await.unwrap();

    let view = wait_for_view(&controller, |v| {
        v.pool_job(&a.id).is_none() && v.pool_job(&b.id).is_none()
    })
    .await;
    let ids: Vec<_> = view.pool.iter().map(|j| j.id.clone()).collect();
    assert_eq!(ids, vec![c.id.clone()]);

    for s in [session, d2, d3] {
        s.shutdown().await;
    }
}

#[tokio::test]
async fn declined_jobs_do_not_hold_pool_slots() {
    let mut h = TestHarness::new().await;
    h.config.view.pool_limit = 1;
    let first = h.seed(10).await;
    let second = h.seed(20).await;

    let session = h.session("d-1").await;
    let controller = session.controller();
    assert_eq!(controller.view().pool[0].id, first.id);

    controller.reject(&first.id).await.unwrap();
    let view = wait_for_view(&controller, |v| v.pool_job(&second.id).is_some()).await;
    assert_eq!(view.pool.len(), 1);
    assert_eq!(
        view.history_job(&first.id).map(|j| j.status),
        Some(JobStatus::Rejected)
    );
    session.shutdown().await;
}

#[tokio::test]
async fn accept_start_complete_moves_job_through_the_view() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();
    let mut events = controller.subscribe_events();

    let accepted = controller.accept(&job.id).await.unwrap();
    assert!(accepted.was_applied());
    // The operation returns once the view reflects the write.
    let view = controller.view();
    assert_eq!(view.active.as_ref().map(|j| j.status), Some(JobStatus::Accepted));
    assert!(view.pool.is_empty());
    assert!(matches!(
        wait_for_event(&mut events, |e| matches!(e, DriverEvent::BecameActive(_))).await,
        DriverEvent::BecameActive(j) if j.id == job.id
    ));

    controller.start(&job.id).await.unwrap();
    assert_eq!(
        controller.view().active.as_ref().map(|j| j.status),
        Some(JobStatus::InProgress)
    );
    wait_for_event(&mut events, |e| {
        matches!(e, DriverEvent::ActiveStatusChanged(j) if j.status == JobStatus::InProgress)
    })
    .await;

    let completed = controller.complete(&job.id).await.unwrap().into_job();
    assert_eq!(completed.status, JobStatus::Completed);
    assert!(completed.completed_at.is_some());

    let view = controller.view();
    assert!(view.active.is_none());
    assert!(view.pool_job(&job.id).is_none());
    let in_history = view.history_job(&job.id).unwrap();
    assert_eq!(in_history.status, JobStatus::Completed);
    assert!(in_history.accepted_at <= in_history.started_at);
    assert!(in_history.started_at <= in_history.completed_at);
    wait_for_event(&mut events, |e| matches!(e, DriverEvent::Completed(_))).await;

    // Once the feeds echo the writes the view must not change again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = controller.view();
    assert!(settled.active.is_none());
    assert!(settled.pool.is_empty());
    assert_eq!(settled.history.len(), 1);
    session.shutdown().await;
}

#[tokio::test]
async fn concurrent_accepts_have_exactly_one_winner() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let one = h.session("d-1").await;
    let two = h.session("d-2").await;
    let (c1, c2) = (one.controller(), two.controller());

    let (r1, r2) = tokio::join!(c1.accept(&job.id), c2.accept(&job.id));
    let (winner, loser, err) = match (r1, r2) {
        (Ok(_), Err(err)) => (&c1, &c2, err),
        (Err(err), Ok(_)) => (&c2, &c1, err),
        other => panic!("expected exactly one winner, got {other:?}"),
    };

    match &err {
        RidelineError::Conflict { current, .. } => {
            assert!(current.is_assigned_to(winner.driver()));
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let stored = h.mock.job(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Accepted);
    assert!(stored.is_assigned_to(winner.driver()));

    let loser_view = wait_for_view(loser, |v| v.pool_job(&job.id).is_none()).await;
    assert!(loser_view.active.is_none());
    assert!(winner.view().active.is_some());

    one.shutdown().await;
    two.shutdown().await;
}

#[tokio::test]
async fn preconditions_fail_before_any_write() {
    let h = TestHarness::new().await;
    let first = h.seed(10).await;
    let second = h.seed(20).await;
    let session = h.session("d-1").await;
    let controller = session.controller();

    let writes = h.mock.write_count();
    let err = controller.start(&first.id).await.unwrap_err();
    assert!(is_precondition(&err, &Precondition::NotActiveJob));
    let err = controller
        .accept(&rideline_core::JobId::new("job-404"))
        .await
        .unwrap_err();
    assert!(is_precondition(&err, &Precondition::NotInPool));
    assert_eq!(h.mock.write_count(), writes);

    controller.accept(&first.id).await.unwrap();
    let writes = h.mock.write_count();
    let err = controller.accept(&second.id).await.unwrap_err();
    assert!(is_precondition(
        &err,
        &Precondition::AlreadyHasActiveJob {
            active: first.id.clone()
        }
    ));
    let err = controller.complete(&first.id).await.unwrap_err();
    assert!(is_precondition(
        &err,
        &Precondition::WrongStatus {
            actual: JobStatus::Accepted
        }
    ));
    assert_eq!(h.mock.write_count(), writes);
    session.shutdown().await;
}

#[tokio::test]
async fn repeated_operations_are_idempotent() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();

    assert!(controller.accept(&job.id).await.unwrap().was_applied());
    let again = controller.accept(&job.id).await.unwrap();
    assert!(matches!(again, TransitionOutcome::AlreadyApplied(ref j) if j.id == job.id));

    controller.start(&job.id).await.unwrap();
    assert!(!controller.start(&job.id).await.unwrap().was_applied());

    controller.complete(&job.id).await.unwrap();
    let writes = h.mock.write_count();
    assert!(!controller.complete(&job.id).await.unwrap().was_applied());
    assert_eq!(h.mock.write_count(), writes);
    session.shutdown().await;
}

#[tokio::test]
async fn transport_failures_are_retried_within_budget() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();

    h.mock.fail_next_writes(1);
    let writes = h.mock.write_count();
    assert!(controller.accept(&job.id).await.unwrap().was_applied());
    assert_eq!(h.mock.write_count(), writes + 2);

    h.mock.fail_next_writes(h.config.writes.max_attempts);
    let err = controller.start(&job.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        controller.view().active.as_ref().map(|j| j.status),
        Some(JobStatus::Accepted)
    );
    session.shutdown().await;
}

#[tokio::test]
async fn pull_mode_reject_hides_job_only_for_that_driver() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let one = h.session("d-1").await;
    let two = h.session("d-2").await;
    let c1 = one.controller();
    let mut events = c1.subscribe_events();

    assert!(c1.reject(&job.id).await.unwrap().was_applied());

    let view = c1.view();
    assert!(view.pool_job(&job.id).is_none());
    let projected = view.history_job(&job.id).unwrap();
    assert_eq!(projected.status, JobStatus::Rejected);
    assert_eq!(projected.rejected_by, Some(DriverId::new("d-1")));
    wait_for_event(&mut events, |e| matches!(e, DriverEvent::Rejected(_))).await;

    // Still pending for everyone else.
    assert_eq!(h.mock.job(&job.id).unwrap().status, JobStatus::Pending);
    let other = wait_for_view(&two.controller(), |v| v.pool_job(&job.id).is_some()).await;
    assert!(other.history.is_empty());

    assert!(!c1.reject(&job.id).await.unwrap().was_applied());
    one.shutdown().await;
    two.shutdown().await;
}

#[tokio::test]
async fn pre_assigned_mode_offers_only_own_jobs_and_rejects_terminally() {
    let h = TestHarness::builder()
        .with_mode(AssignmentMode::PreAssigned)
        .build()
        .await
        .unwrap();
    let mine = h.create(fixtures::pre_assigned_job(20, "d-1")).await;
    let theirs = h.create(fixtures::pre_assigned_job(10, "d-2")).await;
    h.seed(5).await;

    let session = h.session("d-1").await;
    let controller = session.controller();
    let view = controller.view();
    assert_eq!(view.pool.len(), 1);
    assert_eq!(view.pool[0].id, mine.id);
    assert!(view.pool_job(&theirs.id).is_none());

    let rejected = controller.reject(&mine.id).await.unwrap().into_job();
    assert_eq!(rejected.status, JobStatus::Rejected);
    assert!(rejected.rejected_at.is_some());
    let view = controller.view();
    assert!(view.pool.is_empty());
    assert_eq!(
        view.history_job(&mine.id).map(|j| j.status),
        Some(JobStatus::Rejected)
    );
    assert_eq!(h.mock.job(&mine.id).unwrap().status, JobStatus::Rejected);
    session.shutdown().await;
}

#[tokio::test]
async fn requester_cancellation_clears_the_active_job() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();
    let mut events = controller.subscribe_events();
    controller.accept(&job.id).await.unwrap();

    let cancelled = h
        .gateway
        .cancel_as_requester(&job.id, &RequesterId::new(fixtures::REQUESTER))
        .await
        .unwrap();
    assert_eq!(
        cancelled.cancelled_by,
        Some(Actor::Requester(RequesterId::new(fixtures::REQUESTER)))
    );

    let view = wait_for_view(&controller, |v| v.active.is_none()).await;
    assert_eq!(
        view.history_job(&job.id).map(|j| j.status),
        Some(JobStatus::Cancelled)
    );
    wait_for_event(&mut events, |e| matches!(e, DriverEvent::ActiveCleared { .. })).await;
    wait_for_event(&mut events, |e| matches!(e, DriverEvent::Cancelled(_))).await;

    let err = controller.start(&job.id).await.unwrap_err();
    assert!(is_precondition(&err, &Precondition::NotActiveJob));
    session.shutdown().await;
}

#[tokio::test]
async fn driver_cancel_moves_job_to_history() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();
    controller.accept(&job.id).await.unwrap();
    controller.start(&job.id).await.unwrap();

    let cancelled = controller.cancel(&job.id).await.unwrap().into_job();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(Actor::Driver(DriverId::new("d-1"))));
    assert!(!controller.cancel(&job.id).await.unwrap().was_applied());

    let view = controller.view();
    assert!(view.active.is_none());
    assert!(view.history_job(&job.id).is_some());
    session.shutdown().await;
}

#[tokio::test]
async fn updated_profile_is_copied_onto_accepted_jobs() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h
        .session_for(&fixtures::identity("d-1", "Dana"))
        .await;
    let controller = session.controller();
    assert_eq!(controller.profile().display_name, "Dana");

    controller
        .update_profile(&ProfilePatch {
            vehicle_model: Some("Prius".into()),
            license_plate: Some("RDL-042".into()),
            ..ProfilePatch::default()
        })
        .await
        .unwrap();

    let accepted = controller.accept(&job.id).await.unwrap().into_job();
    let snapshot = accepted.driver_snapshot.unwrap();
    assert_eq!(snapshot.name, "Dana");
    assert_eq!(snapshot.vehicle_model, "Prius");
    assert_eq!(snapshot.license_plate, "RDL-042");
    session.shutdown().await;
}

#[tokio::test]
async fn feed_loss_degrades_connectivity_and_recovers() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();
    let mut events = controller.subscribe_events();

    h.mock.fail_next_subscribes(u32::MAX);
    h.mock.disconnect_all();
    wait_for_event(&mut events, |e| {
        matches!(e, DriverEvent::ConnectivityChanged(c) if !c.is_online())
    })
    .await;
    assert!(matches!(controller.connectivity(), Connectivity::Degraded { .. }));

    // The last known view is kept while degraded.
    assert!(controller.view().pool_job(&job.id).is_some());
    let added = h.seed(60).await;

    h.mock.fail_next_subscribes(0);
    let view = wait_for_view(&controller, |v| v.pool_job(&added.id).is_some()).await;
    assert_eq!(view.pool.len(), 2);
    tokio::time::timeout(WAIT, async {
        while !controller.connectivity().is_online() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connectivity restored");
    session.shutdown().await;
}

#[tokio::test]
async fn two_active_jobs_keep_the_earliest_accepted() {
    let h = TestHarness::new().await;
    let first = h.seed(10).await;
    let second = h.seed(20).await;
    let session = h.session("d-1").await;
    let controller = session.controller();
    let mut events = controller.subscribe_events();
    let now = chrono::Utc::now();

    let mut a = first.clone();
    a.status = JobStatus::Accepted;
    a.assigned_driver = Some(DriverId::new("d-1"));
    a.accepted_at = Some(now - chrono::Duration::minutes(5));
    let mut b = second.clone();
    b.status = JobStatus::Accepted;
    b.assigned_driver = Some(DriverId::new("d-1"));
    b.accepted_at = Some(now);
    h.mock.force(b);
    h.mock.force(a);

    let event = wait_for_event(&mut events, |e| {
        matches!(e, DriverEvent::DataInconsistency { .. })
    })
    .await;
    assert!(matches!(
        event,
        DriverEvent::DataInconsistency { ref kept, ref ignored }
            if kept == &first.id && ignored == &vec![second.id.clone()]
    ));
    let view = wait_for_view(&controller, |v| {
        v.active.as_ref().is_some_and(|j| j.id == first.id)
    })
    .await;
    assert!(view.pool.is_empty());
    session.shutdown().await;
}

#[tokio::test]
async fn operations_after_shutdown_report_closed_session() {
    let h = TestHarness::new().await;
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();
    session.shutdown().await;

    assert_eq!(controller.state(), SessionState::Closed);
    let writes = h.mock.write_count();
    let err = controller.accept(&job.id).await.unwrap_err();
    assert!(matches!(err, RidelineError::SessionClosed));
    assert_eq!(h.mock.write_count(), writes);
    assert!(controller.wait_until_synced().await.is_err());
}

#[tokio::test]
async fn supervisor_follows_sign_in_and_out() {
    let h = TestHarness::new().await;
    h.seed(30).await;
    let identity = Arc::new(MockIdentity::new());
    let supervisor = Arc::new(SessionSupervisor::new(
        h.gateway.clone(),
        identity.clone(),
        h.config.clone(),
    ));
    let mut controllers = supervisor.controllers();
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        let cancel = cancel.clone();
        async move { supervisor.run(cancel).await }
    });

    identity.sign_in(fixtures::identity("d-1", "Dana"));
    let first = tokio::time::timeout(WAIT, controllers.wait_for(|c| c.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(first.driver().as_str(), "d-1");
    first.wait_until_synced().await.unwrap();
    assert_eq!(first.view().pool.len(), 1);

    identity.sign_in(fixtures::identity("d-2", "Devi"));
    let second = tokio::time::timeout(
        WAIT,
        controllers.wait_for(|c| c.as_ref().is_some_and(|c| c.driver().as_str() == "d-2")),
    )
    .await
    .unwrap()
    .unwrap()
    .clone()
    .unwrap();
    second.wait_until_synced().await.unwrap();
    assert_eq!(first.state(), SessionState::Closed);

    identity.sign_out();
    tokio::time::timeout(WAIT, controllers.wait_for(|c| c.is_none()))
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(WAIT, async {
        while h.mock.open_feeds() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("every feed unsubscribed after sign-out");

    cancel.cancel();
    tokio::time::timeout(WAIT, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_backed_session_completes_a_job() {
    let h = TestHarness::builder().with_sqlite().build().await.unwrap();
    let job = h.seed(30).await;
    let session = h.session("d-1").await;
    let controller = session.controller();

    controller.accept(&job.id).await.unwrap();
    controller.start(&job.id).await.unwrap();
    controller.complete(&job.id).await.unwrap();

    let stored = h.gateway.get_job(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.revision, 4);

    // The history feed echoes the completion at the same revision.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let view = controller.view();
    assert!(view.active.is_none());
    assert_eq!(
        view.history_job(&job.id).map(|j| j.revision),
        Some(stored.revision)
    );
    session.shutdown().await;
}

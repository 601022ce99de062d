// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor lifecycle: journal fallback, restart recovery, shutdown.

use std::time::Duration;

use railsnipe_config::model::TasksConfig;
use railsnipe_core::{
    ErrorKind, RailsnipeError, ReservationRequest, TaskId, TaskJournal, TaskState, TaskStatus,
};
use railsnipe_engine::LiveUpdate;
use railsnipe_test_utils::EngineHarness;
use railsnipe_test_utils::fixtures::{request, sold_out, srt_reservation, time, train};

fn booked_harness(tasks: TasksConfig) -> EngineHarness {
    let harness = EngineHarness::builder()
        .with_listing(vec![train("301", time(8, 0), true, false)])
        .with_tasks(tasks)
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-1", "301")));
    harness
}

/// The journal is written right after each event goes out, so wait for the
/// terminal write to land.
async fn journaled_terminal(harness: &EngineHarness, id: &TaskId) -> Vec<TaskState> {
    let poll = async {
        loop {
            let history = harness.journal.history(id);
            if history.last().is_some_and(|s| s.status.is_terminal()) {
                return history;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll).await.unwrap()
}

#[tokio::test]
async fn every_state_change_is_journaled() {
    let harness = booked_harness(TasksConfig::default());
    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    let history = journaled_terminal(&harness, &id).await;
    assert_eq!(history.first().unwrap().status, TaskStatus::Pending);
    assert_eq!(history.last().unwrap(), &state);
    assert!(
        history
            .windows(2)
            .all(|w| w[0].last_sequence <= w[1].last_sequence)
    );
}

#[tokio::test]
async fn journal_failures_do_not_stop_the_task() {
    let harness = booked_harness(TasksConfig::default());
    harness.journal.fail_writes(true);

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    assert!(harness.journal.history(&id).is_empty());
}

#[tokio::test]
async fn evicted_tasks_are_served_from_the_journal() {
    let harness = booked_harness(TasksConfig {
        retention_secs: 0,
        ..TasksConfig::default()
    });
    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;
    journaled_terminal(&harness, &id).await;

    assert_eq!(harness.supervisor.evict_finished(), 1);
    assert_eq!(harness.supervisor.active(), 0);

    let from_journal = harness.supervisor.status(&id).await.unwrap();
    assert_eq!(from_journal, state);

    // Cancelling a finished task is a no-op, even after eviction.
    harness.supervisor.cancel(&id).await.unwrap();

    // Subscribing yields the final state and nothing else.
    let mut feed = harness.supervisor.subscribe(&id).await.unwrap();
    assert_eq!(feed.next().await, Some(LiveUpdate::Snapshot(state)));
    assert_eq!(feed.next().await, None);
}

#[tokio::test]
async fn running_tasks_are_never_evicted() {
    let harness = EngineHarness::builder()
        .with_listing(vec![sold_out("301", time(8, 0))])
        .with_tasks(TasksConfig {
            retention_secs: 0,
            ..TasksConfig::default()
        })
        .build();
    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    harness.wait_until(&id, |s| s.attempt_count >= 1).await;

    assert_eq!(harness.supervisor.evict_finished(), 0);
    assert_eq!(harness.supervisor.active(), 1);
    harness.supervisor.cancel(&id).await.unwrap();
    assert_eq!(harness.finish(&id).await.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn unknown_tasks_are_not_found() {
    let harness = EngineHarness::builder().build();
    let unknown = TaskId("t-does-not-exist".to_string());

    assert!(matches!(
        harness.supervisor.status(&unknown).await,
        Err(RailsnipeError::TaskNotFound(_))
    ));
    assert!(matches!(
        harness.supervisor.cancel(&unknown).await,
        Err(RailsnipeError::TaskNotFound(_))
    ));
    assert!(harness.supervisor.subscribe(&unknown).await.is_err());
}

#[tokio::test]
async fn tasks_left_running_by_a_previous_process_are_failed() {
    let harness = EngineHarness::builder().build();
    let req: ReservationRequest = request("alice", &["301"]);
    let mut orphan = TaskState::pending(TaskId::generate(), &req);
    orphan.status = TaskStatus::Running;
    orphan.attempt_count = 12;
    harness.journal.insert(orphan.clone());

    assert_eq!(harness.supervisor.recover_interrupted().await.unwrap(), 1);
    let state = harness.supervisor.status(&orphan.task_id).await.unwrap();
    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.attempt_count, 12);
    assert_eq!(state.last_error.unwrap().kind, ErrorKind::Internal);

    // A second pass finds nothing left to fail.
    assert_eq!(harness.journal.mark_interrupted().await.unwrap(), 0);
}

#[tokio::test]
async fn shutdown_cancels_running_tasks_and_refuses_new_ones() {
    let harness = EngineHarness::builder()
        .with_listing(vec![sold_out("301", time(8, 0))])
        .build();
    let first = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let second = harness.supervisor.start(request("bob", &["301"])).await.unwrap();
    harness.wait_until(&first, |s| s.attempt_count >= 1).await;
    harness.wait_until(&second, |s| s.attempt_count >= 1).await;

    assert!(harness.supervisor.shutdown(Duration::from_secs(5)).await);

    for id in [&first, &second] {
        let state = harness.supervisor.status(id).await.unwrap();
        assert_eq!(state.status, TaskStatus::Cancelled);
        let journaled = harness.journal.load(id).await.unwrap().unwrap();
        assert_eq!(journaled.status, TaskStatus::Cancelled);
    }
    assert_eq!(harness.supervisor.active(), 0);
    assert!(harness.supervisor.start(request("alice", &["301"])).await.is_err());
}

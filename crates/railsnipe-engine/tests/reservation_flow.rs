// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reservation tasks driven end to end through the supervisor.
//!
//! Each test builds an isolated EngineHarness over a scripted provider.
//! Retry pacing is a few milliseconds, so retry loops run in real time.

use std::time::{Duration, Instant};

use railsnipe_config::model::RetryConfig;
use railsnipe_core::{
    ErrorClass, ErrorKind, NotificationKind, Passengers, ProgressKind, TaskStatus, UpstreamError,
};
use railsnipe_engine::{LiveUpdate, derive_ref};
use railsnipe_test_utils::fixtures::{request, sold_out, srt_reservation, srt_waiting, time, train};
use railsnipe_test_utils::{EngineHarness, ScriptedAuthenticator, UpstreamCall, fast_retry};

fn open_listing() -> Vec<railsnipe_core::TrainOption> {
    vec![train("301", time(8, 0), true, false)]
}

// ---- Success paths ----

#[tokio::test]
async fn first_open_seat_is_booked() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    let booked = srt_reservation("R-1", "301");
    harness.upstream.push_reserve(Ok(booked.clone()));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    assert_eq!(state.attempt_count, 1);
    assert!(state.last_error.is_none());
    let result = state.result.expect("success carries a result");
    assert_eq!(result.record_ref, derive_ref(&booked));
    assert_eq!(result.train.train_no, "301");
    assert!(result.seats[0].starts_with("3호차 7A"));
    assert!(!result.paid);

    let sent = harness.notifications(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Success);
    assert!(sent[0].message.starts_with("🎫 🎉 예매 성공!!! 🎉 🎫"));
    assert!(sent[0].message.ends_with("결제 대기"));
}

#[tokio::test]
async fn sold_out_reserve_is_retried_until_a_seat_frees_up() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness
        .upstream
        .push_reserve(Err(railsnipe_test_utils::sold_out_error()));
    harness.upstream.push_reserve(Ok(srt_reservation("R-2", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    assert_eq!(state.attempt_count, 2);
    assert_eq!(harness.upstream.reserve_calls(), 2);
    assert!(harness.upstream.search_calls() >= 2);
}

#[tokio::test]
async fn waitlisted_reservation_keeps_looking() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness.upstream.push_reserve(Ok(srt_waiting("W-1", "301")));
    harness.upstream.push_reserve(Ok(srt_reservation("R-3", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    assert_eq!(state.attempt_count, 2);
    assert_eq!(
        state.result.unwrap().record_ref,
        derive_ref(&srt_reservation("R-3", "301"))
    );
}

#[tokio::test]
async fn later_candidate_is_used_when_the_first_is_sold_out() {
    let harness = EngineHarness::builder()
        .with_listing(vec![
            sold_out("301", time(8, 0)),
            train("305", time(9, 0), true, false),
        ])
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-4", "305")));

    let id = harness
        .supervisor
        .start(request("alice", &["301", "305"]))
        .await
        .unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    let reserved: Vec<String> = harness
        .upstream
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            UpstreamCall::Reserve { train_no, .. } => Some(train_no),
            _ => None,
        })
        .collect();
    assert_eq!(reserved, vec!["305".to_string()]);
}

#[tokio::test]
async fn transient_search_failures_are_retried() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness
        .upstream
        .push_search(Err(UpstreamError::transient("connection reset")));
    harness
        .upstream
        .push_search(Err(UpstreamError::transient("502 bad gateway")));
    harness.upstream.push_reserve(Ok(srt_reservation("R-5", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    // Search failures are not reservation attempts.
    assert_eq!(state.attempt_count, 1);
    assert_eq!(harness.upstream.search_calls(), 3);
}

fn call_names(harness: &EngineHarness) -> Vec<&'static str> {
    harness
        .upstream
        .calls()
        .iter()
        .map(|call| match call {
            UpstreamCall::Search { .. } => "search",
            UpstreamCall::Reserve { .. } => "reserve",
            UpstreamCall::Pay { .. } => "pay",
            UpstreamCall::Cancel { .. } => "cancel",
            UpstreamCall::List { .. } => "list",
        })
        .collect()
}

async fn failed_search_is_followed_by_a_fresh_search(search_error: UpstreamError) {
    // Only the first listing shows 301 open; every later one is sold out.
    let harness = EngineHarness::builder()
        .with_listing(vec![sold_out("301", time(8, 0))])
        .build();
    harness.upstream.push_search(Ok(open_listing()));
    harness.upstream.push_search(Err(search_error));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    harness
        .wait_until(&id, |_| harness.upstream.search_calls() >= 4)
        .await;
    harness.supervisor.cancel(&id).await.unwrap();
    harness.finish(&id).await;

    let calls = call_names(&harness);
    assert_eq!(calls[..4], ["search", "reserve", "search", "search"], "{calls:?}");
    assert_eq!(harness.upstream.reserve_calls(), 1);
}

#[tokio::test]
async fn transient_search_failure_does_not_reserve_from_a_stale_listing() {
    failed_search_is_followed_by_a_fresh_search(UpstreamError::transient("connection reset")).await;
}

#[tokio::test]
async fn expired_session_during_search_searches_again_after_login() {
    failed_search_is_followed_by_a_fresh_search(UpstreamError::new(
        ErrorClass::SessionExpired,
        "로그인 후 사용하십시오",
    ))
    .await;
}

// ---- Sold out and cancellation ----

#[tokio::test]
async fn sold_out_task_keeps_running_until_cancelled() {
    let harness = EngineHarness::builder()
        .with_listing(vec![sold_out("301", time(8, 0))])
        .build();

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let running = harness
        .wait_until(&id, |s| s.attempt_count >= 3)
        .await;
    assert_eq!(running.status, TaskStatus::Running);
    assert_eq!(running.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::NoSeat));

    harness.supervisor.cancel(&id).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Cancelled);
    assert!(state.attempt_count >= 3);
    assert!(state.last_error.is_none());
    assert!(state.finished_at.is_some());
    // Nothing was ever open, so nothing was reserved.
    assert_eq!(harness.upstream.reserve_calls(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn cancel_interrupts_a_long_wait() {
    let harness = EngineHarness::builder()
        .with_listing(vec![sold_out("301", time(8, 0))])
        .with_retry(RetryConfig {
            floor_secs: 5.0,
            ..fast_retry()
        })
        .build();

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    // The no-seat note is published right before the task goes to sleep.
    harness.wait_until(&id, |s| s.last_error.is_some()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let cancelled_at = Instant::now();
    harness.supervisor.cancel(&id).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Cancelled);
    assert_eq!(state.attempt_count, 1);
    assert!(
        cancelled_at.elapsed() < Duration::from_millis(500),
        "cancellation took {:?}",
        cancelled_at.elapsed()
    );
}

#[tokio::test]
async fn reservation_in_flight_survives_cancellation() {
    let harness = EngineHarness::builder()
        .with_listing(open_listing())
        .with_upstream(
            railsnipe_test_utils::ScriptedUpstream::new()
                .with_reserve_delay(Duration::from_millis(200)),
        )
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-6", "301")));

    let mut req = request("alice", &["301"]);
    req.auto_payment = true;
    let id = harness.supervisor.start(req).await.unwrap();
    harness.wait_until(&id, |s| s.attempt_count >= 1).await;
    harness.supervisor.cancel(&id).await.unwrap();

    let state = harness.finish(&id).await;
    assert_eq!(state.status, TaskStatus::Success);
    let result = state.result.unwrap();
    assert!(!result.paid);
    assert!(result.payment_error.unwrap().contains("cancelled"));
    assert_eq!(harness.upstream.pay_calls(), 0);
}

// ---- Fatal failures ----

#[tokio::test]
async fn malformed_request_fails_without_touching_the_provider() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    let mut req = request("alice", &["301"]);
    req.passengers = Passengers::adults(0);

    let id = harness.supervisor.start(req).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.attempt_count, 0);
    let error = state.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert!(!error.message.is_empty());
    assert!(harness.upstream.calls().is_empty());

    let sent = harness.notifications(1).await;
    assert_eq!(sent[0].kind, NotificationKind::Failure);
    assert!(sent[0].message.starts_with("❌ 예약 실패"));
}

#[tokio::test]
async fn rejected_login_fails_with_auth() {
    let auth = ScriptedAuthenticator::new();
    auth.push(Err(UpstreamError::from_message(
        "로그인 정보를 다시 확인하십시오",
    )));
    let harness = EngineHarness::builder()
        .with_listing(open_listing())
        .with_authenticator(auth)
        .build();

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.last_error.unwrap().kind, ErrorKind::Auth);
    assert_eq!(harness.upstream.search_calls(), 0);
}

#[tokio::test]
async fn repeated_bot_detection_fails_with_rate_limit() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    // The harness tolerates three consecutive detections.
    for _ in 0..4 {
        harness
            .upstream
            .push_search(Err(UpstreamError::from_message("정상적인 경로로 접근 부탁드립니다")));
    }

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.last_error.unwrap().kind, ErrorKind::RateLimit);
    assert_eq!(state.attempt_count, 0);
    // Every detection discards the session.
    assert!(harness.auth.logins() >= 4);
}

// ---- Sessions ----

#[tokio::test]
async fn expired_session_is_renewed_once_and_the_attempt_repeated() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness.upstream.push_reserve(Err(UpstreamError::new(
        ErrorClass::SessionExpired,
        "로그인 후 사용하십시오",
    )));
    harness.upstream.push_reserve(Ok(srt_reservation("R-7", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    assert_eq!(state.attempt_count, 2);
    assert_eq!(harness.auth.logins(), 2);
    let tokens: Vec<String> = harness
        .upstream
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            UpstreamCall::Reserve { token, .. } => Some(token),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["token-1".to_string(), "token-2".to_string()]);
}

#[tokio::test]
async fn session_rejected_twice_in_a_row_fails_with_auth() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    for _ in 0..2 {
        harness.upstream.push_reserve(Err(UpstreamError::new(
            ErrorClass::SessionExpired,
            "로그인 후 사용하십시오",
        )));
    }

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.last_error.unwrap().kind, ErrorKind::Auth);
}

#[tokio::test]
async fn concurrent_tasks_for_one_user_share_a_login() {
    let harness = EngineHarness::builder()
        .with_listing(open_listing())
        .with_authenticator(ScriptedAuthenticator::new().with_delay(Duration::from_millis(50)))
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-8", "301")));
    harness.upstream.push_reserve(Ok(srt_reservation("R-9", "301")));

    let first = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let second = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let a = harness.finish(&first).await;
    let b = harness.finish(&second).await;

    assert_eq!(a.status, TaskStatus::Success);
    assert_eq!(b.status, TaskStatus::Success);
    assert_ne!(a.result.unwrap().record_ref, b.result.unwrap().record_ref);
    assert_eq!(harness.auth.logins(), 1);
}

// ---- Auto-payment ----

#[tokio::test]
async fn auto_payment_pays_the_reservation() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-10", "301")));
    let mut req = request("alice", &["301"]);
    req.auto_payment = true;

    let id = harness.supervisor.start(req).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    let result = state.result.unwrap();
    assert!(result.paid);
    assert!(result.payment_error.is_none());
    assert_eq!(harness.upstream.pay_calls(), 1);
    assert!(harness.notifications(1).await[0].message.ends_with("결제 완료"));
}

#[tokio::test]
async fn failed_payment_keeps_the_reservation() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-11", "301")));
    harness
        .upstream
        .push_pay(Err(UpstreamError::from_message("카드 한도 초과")));
    let mut req = request("alice", &["301"]);
    req.auto_payment = true;

    let id = harness.supervisor.start(req).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    let result = state.result.unwrap();
    assert!(!result.paid);
    assert!(result.payment_error.unwrap().contains("카드 한도 초과"));
    assert!(
        harness.notifications(1).await[0]
            .message
            .ends_with("결제 실패: 카드 한도 초과")
    );
}

#[tokio::test]
async fn missing_card_skips_payment() {
    let harness = EngineHarness::builder()
        .with_listing(open_listing())
        .without_card()
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-12", "301")));
    let mut req = request("alice", &["301"]);
    req.auto_payment = true;

    let id = harness.supervisor.start(req).await.unwrap();
    let state = harness.finish(&id).await;

    assert_eq!(state.status, TaskStatus::Success);
    let result = state.result.unwrap();
    assert!(!result.paid);
    assert!(result.payment_error.unwrap().contains("no payment card"));
    assert_eq!(harness.upstream.pay_calls(), 0);
}

// ---- Notifications and the live feed ----

#[tokio::test]
async fn terminal_notification_is_sent_exactly_once() {
    let harness = EngineHarness::builder().with_listing(open_listing()).build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-13", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    harness.finish(&id).await;
    harness.notifications(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user.0, "alice");
}

#[tokio::test]
async fn notifier_failure_does_not_change_the_outcome() {
    let harness = EngineHarness::builder()
        .with_listing(open_listing())
        .with_failing_notifier()
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-14", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let state = harness.finish(&id).await;
    harness.notifications(1).await;

    assert_eq!(state.status, TaskStatus::Success);
    assert_eq!(
        harness.supervisor.status(&id).await.unwrap().status,
        TaskStatus::Success
    );
}

#[tokio::test]
async fn live_feed_starts_with_a_snapshot_and_ends_with_the_outcome() {
    let harness = EngineHarness::builder()
        .with_listing(open_listing())
        .with_upstream(
            railsnipe_test_utils::ScriptedUpstream::new()
                .with_reserve_delay(Duration::from_millis(100)),
        )
        .build();
    harness.upstream.push_reserve(Ok(srt_reservation("R-15", "301")));

    let id = harness.supervisor.start(request("alice", &["301"])).await.unwrap();
    let mut feed = harness.supervisor.subscribe(&id).await.unwrap();

    let mut updates = Vec::new();
    while let Some(update) = tokio::time::timeout(Duration::from_secs(10), feed.next())
        .await
        .unwrap()
    {
        updates.push(update);
    }

    assert!(matches!(updates.first(), Some(LiveUpdate::Snapshot(_))));
    let sequences: Vec<u64> = updates
        .iter()
        .filter_map(|u| match u {
            LiveUpdate::Event(e) => Some(e.sequence),
            LiveUpdate::Snapshot(_) => None,
        })
        .collect();
    assert!(!sequences.is_empty());
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    match updates.last() {
        Some(LiveUpdate::Event(last)) => {
            assert_eq!(last.kind, ProgressKind::Success);
            assert_eq!(last.task_id, id);
            assert_eq!(last.attempt_count, 1);
        }
        other => panic!("expected a final event, got {other:?}"),
    }
}

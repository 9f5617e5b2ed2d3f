// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use std::time::Duration;

fn token() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn wait_if_paused_returns_immediately_when_not_paused() {
    let cp = ControlPlane::new();
    cp.wait_if_paused(&token()).await.unwrap();
}

#[tokio::test]
async fn resume_without_pause_is_a_no_op() {
    let cp = ControlPlane::new();
    cp.resume();
    assert!(!cp.is_paused());
    cp.wait_if_paused(&token()).await.unwrap();
}

#[tokio::test]
async fn pause_blocks_wait_and_resume_releases_it() {
    let cp = Arc::new(ControlPlane::new());
    cp.pause();
    assert!(cp.is_paused());

    let waiter = {
        let cp = cp.clone();
        tokio::spawn(async move { cp.wait_if_paused(&token()).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    cp.resume();
    let result = waiter.await.unwrap();
    assert!(result.is_ok());
    assert!(!cp.is_paused());
}

#[tokio::test]
async fn pause_is_idempotent() {
    let cp = ControlPlane::new();
    cp.pause();
    cp.pause();
    assert!(cp.is_paused());
}

#[tokio::test]
async fn cancel_while_paused_wakes_waiter_with_cancelled() {
    let cp = Arc::new(ControlPlane::new());
    cp.pause();

    let waiter = {
        let cp = cp.clone();
        tokio::spawn(async move { cp.wait_if_paused(&token()).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cp.cancel();

    let result = waiter.await.unwrap();
    assert_eq!(result.unwrap_err().code(), "CANCELLED");
}

#[tokio::test]
async fn cancelled_plane_short_circuits_future_waits() {
    let cp = ControlPlane::new();
    cp.cancel();
    let err = cp.wait_if_paused(&token()).await.unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
}

#[tokio::test]
async fn cancel_is_one_shot() {
    let cp = ControlPlane::new();
    cp.cancel();
    cp.cancel();
    assert!(cp.is_cancelled());
}

#[tokio::test]
async fn caller_cancellation_unblocks_wait_without_resume() {
    let cp = Arc::new(ControlPlane::new());
    cp.pause();
    let caller_token = token();

    let waiter = {
        let cp = cp.clone();
        let caller_token = caller_token.clone();
        tokio::spawn(async move { cp.wait_if_paused(&caller_token).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    caller_token.cancel();

    let result = waiter.await.unwrap();
    assert!(result.is_err());
    // the control plane itself was never cancelled
    assert!(!cp.is_cancelled());
}

#[tokio::test]
async fn request_user_input_round_trips_through_provide() {
    let cp = Arc::new(ControlPlane::new());
    let consumer = {
        let cp = cp.clone();
        tokio::spawn(async move {
            let req = cp.recv_input_request().await.unwrap();
            cp.provide_user_input(&req.id, "yes").unwrap();
        })
    };

    let answer = cp
        .request_user_input(InputRequest::new("req-1", "continue?"), &token())
        .await
        .unwrap();
    assert_eq!(answer, "yes");
    consumer.await.unwrap();
    assert!(!cp.has_pending_input());
}

#[tokio::test]
async fn request_user_input_reports_cancellation() {
    let cp = Arc::new(ControlPlane::new());
    let consumer = {
        let cp = cp.clone();
        tokio::spawn(async move {
            let req = cp.recv_input_request().await.unwrap();
            cp.cancel_user_input(&req.id).unwrap();
        })
    };

    let err = cp
        .request_user_input(InputRequest::new("req-2", "continue?"), &token())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
    consumer.await.unwrap();
}

#[tokio::test]
async fn provide_user_input_on_unknown_id_errors() {
    let cp = ControlPlane::new();
    let err = cp.provide_user_input("missing", "x").unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn has_pending_input_reflects_outstanding_requests() {
    let cp = Arc::new(ControlPlane::new());
    assert!(!cp.has_pending_input());

    let waiter = {
        let cp = cp.clone();
        tokio::spawn(async move { cp.request_user_input(InputRequest::new("req-3", "?"), &token()).await })
    };
    // give the request time to register before the (never-answered) consumer drains it
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _ = cp.recv_input_request().await;
    assert!(cp.has_pending_input());

    cp.cancel_user_input("req-3").unwrap();
    let _ = waiter.await.unwrap();
}

#[tokio::test]
async fn retry_task_drops_silently_on_overflow() {
    let cp = ControlPlane::new();
    for i in 0..RETRY_QUEUE_CAPACITY + 5 {
        cp.retry_task(format!("task-{i}"));
    }
    let mut drained = 0;
    while tokio::time::timeout(Duration::from_millis(10), cp.recv_retry())
        .await
        .is_ok()
    {
        drained += 1;
    }
    assert_eq!(drained, RETRY_QUEUE_CAPACITY);
}

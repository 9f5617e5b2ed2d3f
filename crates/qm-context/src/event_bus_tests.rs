// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn subscriber_receives_published_event() {
    let bus = TokioEventBus::new(8);
    let mut rx = bus.subscribe();
    bus.publish(WorkflowEvent::new("started", serde_json::json!({"id": 1}), Utc::now()))
        .unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, "started");
}

#[test]
fn publish_without_subscribers_does_not_error() {
    let bus = TokioEventBus::new(8);
    assert!(bus
        .publish(WorkflowEvent::new("noop", serde_json::Value::Null, Utc::now()))
        .is_ok());
}

#[tokio::test]
async fn fake_event_bus_records_history_and_forwards() {
    let bus = fake::FakeEventBus::new();
    let mut rx = bus.subscribe();
    bus.publish(WorkflowEvent::new("a", serde_json::Value::Null, Utc::now()))
        .unwrap();
    bus.publish(WorkflowEvent::new("b", serde_json::Value::Null, Utc::now()))
        .unwrap();

    assert_eq!(bus.published().len(), 2);
    assert_eq!(rx.recv().await.unwrap().kind, "a");
    assert_eq!(rx.recv().await.unwrap().kind, "b");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `EventBus` collaborator (spec §4.3, §6): broadcasts workflow events
//! to any number of subscribers.

use chrono::{DateTime, Utc};
use qm_core::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event published on a project's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub kind: String,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            at,
        }
    }
}

pub trait EventBus: Send + Sync {
    fn publish(&self, event: WorkflowEvent) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent>;
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Production event bus backed by `tokio::sync::broadcast`. Publishing with
/// no subscribers is not an error — the bus is fire-and-forget.
pub struct TokioEventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl TokioEventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }
}

impl EventBus for TokioEventBus {
    fn publish(&self, event: WorkflowEvent) -> Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every published event in addition to forwarding it on a real
    /// broadcast channel, so tests can assert both on history and delivery.
    #[derive(Clone)]
    pub struct FakeEventBus {
        tx: broadcast::Sender<WorkflowEvent>,
        published: Arc<Mutex<Vec<WorkflowEvent>>>,
    }

    impl FakeEventBus {
        pub fn new() -> Self {
            let (tx, _rx) = broadcast::channel(100);
            Self {
                tx,
                published: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn published(&self) -> Vec<WorkflowEvent> {
            self.published.lock().clone()
        }
    }

    impl Default for FakeEventBus {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EventBus for FakeEventBus {
        fn publish(&self, event: WorkflowEvent) -> Result<()> {
            self.published.lock().push(event.clone());
            let _ = self.tx.send(event);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
            self.tx.subscribe()
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;

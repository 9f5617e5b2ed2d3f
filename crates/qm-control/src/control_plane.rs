// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow control primitive: pause/resume, cooperative cancellation,
//! a retry queue, and a request/reply rendezvous for human input (spec §4.4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use qm_core::{Error, Result};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::request::{InputReply, InputRequest};

const RETRY_QUEUE_CAPACITY: usize = 100;
const INPUT_REQUEST_CHANNEL_CAPACITY: usize = 1;
/// How long `request_user_input` waits for a listener to drain the
/// input-request channel before giving up (spec: "implementation-defined
/// short timeout").
const PUBLISH_TIMEOUT: Duration = Duration::from_millis(500);

struct Gates {
    pause_gate: CancellationToken,
    resume_gate: CancellationToken,
}

impl Default for Gates {
    fn default() -> Self {
        Self {
            pause_gate: CancellationToken::new(),
            resume_gate: CancellationToken::new(),
        }
    }
}

/// Per-workflow control plane. Cheap to clone: all shared state lives
/// behind `Arc`s inside the channels and tokens.
pub struct ControlPlane {
    paused: AtomicBool,
    cancel_token: CancellationToken,
    gates: Mutex<Gates>,
    retry_tx: mpsc::Sender<String>,
    retry_rx: AsyncMutex<mpsc::Receiver<String>>,
    input_tx: mpsc::Sender<InputRequest>,
    input_rx: AsyncMutex<mpsc::Receiver<InputRequest>>,
    pending_inputs: Mutex<HashMap<String, oneshot::Sender<InputReply>>>,
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane {
    pub fn new() -> Self {
        let (retry_tx, retry_rx) = mpsc::channel(RETRY_QUEUE_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(INPUT_REQUEST_CHANNEL_CAPACITY);
        Self {
            paused: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            gates: Mutex::new(Gates::default()),
            retry_tx,
            retry_rx: AsyncMutex::new(retry_rx),
            input_tx,
            input_rx: AsyncMutex::new(input_rx),
            pending_inputs: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Pauses the workflow. A no-op if already paused.
    pub fn pause(&self) {
        if self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut gates = self.gates.lock();
        gates.pause_gate.cancel();
        gates.resume_gate = CancellationToken::new();
    }

    /// Resumes the workflow, releasing any `wait_if_paused` callers. A
    /// no-op if not currently paused.
    pub fn resume(&self) {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut gates = self.gates.lock();
        gates.resume_gate.cancel();
        gates.pause_gate = CancellationToken::new();
    }

    /// Cancels the workflow once. Wakes every `wait_if_paused` caller and
    /// every outstanding input request with `cancelled = true`.
    pub fn cancel(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        self.cancel_token.cancel();
        let pending: Vec<_> = self.pending_inputs.lock().drain().collect();
        for (_, reply_tx) in pending {
            let _ = reply_tx.send(InputReply::Cancelled);
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Blocks while paused. Returns immediately if not paused, or if this
    /// plane was already cancelled. Returns `Ok(())` on resume and
    /// `Err(Cancelled)` if either this plane or the caller's own token
    /// cancels while waiting.
    pub async fn wait_if_paused(&self, cancel: &CancellationToken) -> Result<()> {
        self.check_cancelled()?;
        if !self.is_paused() {
            return Ok(());
        }
        let resume_gate = self.gates.lock().resume_gate.clone();
        tokio::select! {
            _ = resume_gate.cancelled() => Ok(()),
            _ = self.cancel_token.cancelled() => Err(Error::Cancelled),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Publishes a request on the input-request channel and awaits a
    /// reply, a cancellation of `req`'s id, this plane's cancellation, or
    /// the caller's own cancellation. Cleans up the pending entry on every
    /// path.
    pub async fn request_user_input(
        &self,
        req: InputRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.check_cancelled()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending_inputs.lock().insert(req.id.clone(), reply_tx);

        if self.input_tx.send_timeout(req.clone(), PUBLISH_TIMEOUT).await.is_err() {
            self.pending_inputs.lock().remove(&req.id);
            return Err(Error::Conflict(
                "input request channel is full or has no listener".into(),
            ));
        }

        let result = tokio::select! {
            reply = reply_rx => match reply {
                Ok(InputReply::Provided(text)) => Ok(text),
                Ok(InputReply::Cancelled) => Err(Error::Cancelled),
                Err(_) => Err(Error::Cancelled),
            },
            _ = self.cancel_token.cancelled() => Err(Error::Cancelled),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        };
        self.pending_inputs.lock().remove(&req.id);
        result
    }

    /// The consumer side of the input-request channel: a single task is
    /// expected to loop on this and answer via `provide_user_input` /
    /// `cancel_user_input`.
    pub async fn recv_input_request(&self) -> Option<InputRequest> {
        let mut rx = self.input_rx.lock().await;
        rx.recv().await
    }

    pub fn provide_user_input(&self, id: &str, text: impl Into<String>) -> Result<()> {
        let reply_tx = self
            .pending_inputs
            .lock()
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let _ = reply_tx.send(InputReply::Provided(text.into()));
        Ok(())
    }

    pub fn cancel_user_input(&self, id: &str) -> Result<()> {
        let reply_tx = self
            .pending_inputs
            .lock()
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let _ = reply_tx.send(InputReply::Cancelled);
        Ok(())
    }

    pub fn has_pending_input(&self) -> bool {
        !self.pending_inputs.lock().is_empty()
    }

    /// Non-blocking enqueue; silently drops the task id if the queue is
    /// full (spec: "overflow silently drops the newest").
    pub fn retry_task(&self, id: impl Into<String>) {
        let id = id.into();
        if let Err(mpsc::error::TrySendError::Full(id)) = self.retry_tx.try_send(id.clone()) {
            warn!(task_id = %id, "retry queue full, dropping");
        }
    }

    /// The consumer side of the retry queue.
    pub async fn recv_retry(&self) -> Option<String> {
        let mut rx = self.retry_rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
#[path = "control_plane_tests.rs"]
mod tests;

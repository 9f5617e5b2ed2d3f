// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane rendezvous types (spec §3, §4.4).

use std::collections::HashMap;

/// A request for input from a human, published on the control plane's
/// input-request channel and awaited by `request_user_input`.
#[derive(Debug, Clone)]
pub struct InputRequest {
    pub id: String,
    pub prompt: String,
    pub metadata: HashMap<String, String>,
}

impl InputRequest {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Delivered to a waiting `request_user_input` caller: either the provided
/// text, or a cancellation (mirrors spec's `InputResponse{input, cancelled}`
/// as a sum type rather than a boolean flag).
#[derive(Debug, Clone)]
pub(crate) enum InputReply {
    Provided(String),
    Cancelled,
}

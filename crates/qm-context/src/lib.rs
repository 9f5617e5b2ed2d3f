// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qm-context: the per-project runtime bundle (spec §4.3) — state manager,
//! event bus, config loader, attachment store, and chat store, plus the
//! `ProjectContext` composite that owns and constructs them.

mod attachment;
mod chat;
mod closeable;
mod config;
mod context;
mod event_bus;
mod state;

pub use attachment::{AttachmentStore, DirAttachmentStore};
pub use chat::{ChatMessage, ChatStore, FileChatStore, ChatSession};
pub use closeable::Closeable;
pub use config::{global_config_path, ConfigLoader, EventBusSection, ProjectConfig, StateSection, YamlConfigLoader};
pub use context::{ProjectContext, ProjectContextOptions, DEFAULT_EVENT_BUFFER_SIZE};
pub use event_bus::{EventBus, TokioEventBus, WorkflowEvent};
pub use state::{FileStateManager, StateManager, StateManagerOptions};

#[cfg(any(test, feature = "test-support"))]
pub use attachment::fake::FakeAttachmentStore;
#[cfg(any(test, feature = "test-support"))]
pub use chat::fake::FakeChatStore;
#[cfg(any(test, feature = "test-support"))]
pub use config::fake::FakeConfigLoader;
#[cfg(any(test, feature = "test-support"))]
pub use event_bus::fake::FakeEventBus;
#[cfg(any(test, feature = "test-support"))]
pub use state::fake::FakeStateManager;

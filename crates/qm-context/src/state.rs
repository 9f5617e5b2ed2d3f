// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `StateManager` collaborator (spec §4.3, §6): tracks whether a
//! project's state store exists and which workflows are currently running.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use qm_core::{fsutil, Result};

use crate::closeable::Closeable;

#[derive(Debug, Clone, Default)]
pub struct StateManagerOptions {
    pub create_if_missing: bool,
}

#[async_trait]
pub trait StateManager: Send + Sync {
    async fn exists(&self) -> Result<bool>;
    async fn list_running_workflows(&self) -> Result<Vec<String>>;
    fn as_closeable(&self) -> Option<&dyn Closeable> {
        None
    }
}

/// Minimal JSON-on-disk state store: a single file holding the ids of
/// workflows currently running for this project. Satisfies the
/// `StateManager` *interface* contract only — the on-disk schema is not part
/// of this crate's scope.
pub struct FileStateManager {
    path: PathBuf,
    running: RwLock<Vec<String>>,
}

impl FileStateManager {
    pub async fn open(path: impl Into<PathBuf>, options: StateManagerOptions) -> Result<Self> {
        let path = path.into();
        let running = if path.is_file() {
            let bytes = std::fs::read(&path)?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                Vec::new()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else if options.create_if_missing {
            fsutil::atomic_write(&path, b"[]")?;
            Vec::new()
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            running: RwLock::new(running),
        })
    }

    pub fn mark_running(&self, workflow_id: impl Into<String>) -> Result<()> {
        let workflow_id = workflow_id.into();
        {
            let mut running = self.running.write();
            if !running.contains(&workflow_id) {
                running.push(workflow_id);
            }
        }
        self.persist()
    }

    pub fn mark_finished(&self, workflow_id: &str) -> Result<()> {
        self.running.write().retain(|id| id != workflow_id);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let data = serde_json::to_vec(&*self.running.read())?;
        fsutil::atomic_write(&self.path, &data)
    }
}

#[async_trait]
impl StateManager for FileStateManager {
    async fn exists(&self) -> Result<bool> {
        Ok(self.path.is_file())
    }

    async fn list_running_workflows(&self) -> Result<Vec<String>> {
        Ok(self.running.read().clone())
    }

    fn as_closeable(&self) -> Option<&dyn Closeable> {
        Some(self)
    }
}

impl Closeable for FileStateManager {
    fn close(&self) -> Result<()> {
        self.persist()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    struct FakeState {
        exists: bool,
        running: Vec<String>,
        close_calls: u32,
    }

    /// Records calls and lets tests script `exists`/`list_running_workflows`.
    #[derive(Clone, Default)]
    pub struct FakeStateManager {
        inner: Arc<RwLock<FakeState>>,
    }

    impl FakeStateManager {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_exists(&self, exists: bool) {
            self.inner.write().exists = exists;
        }

        pub fn set_running_workflows(&self, ids: Vec<String>) {
            self.inner.write().running = ids;
        }

        pub fn close_calls(&self) -> u32 {
            self.inner.read().close_calls
        }
    }

    #[async_trait]
    impl StateManager for FakeStateManager {
        async fn exists(&self) -> Result<bool> {
            Ok(self.inner.read().exists)
        }

        async fn list_running_workflows(&self) -> Result<Vec<String>> {
            Ok(self.inner.read().running.clone())
        }

        fn as_closeable(&self) -> Option<&dyn Closeable> {
            Some(self)
        }
    }

    impl Closeable for FakeStateManager {
        fn close(&self) -> Result<()> {
            self.inner.write().close_calls += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

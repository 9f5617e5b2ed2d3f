// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ProjectContext` (spec §4.3): the composite owner of a project's runtime
//! state — state manager, event bus, config loader, attachment store, and
//! chat store — and the 5-step construction sequence that wires them
//! together from a project root.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use qm_core::{fsutil, ConfigMode, Error, ProjectId, Result};
use tracing::{debug, warn};

use crate::attachment::{AttachmentStore, DirAttachmentStore};
use crate::chat::{ChatStore, FileChatStore};
use crate::config::{global_config_path, ConfigLoader, YamlConfigLoader};
use crate::event_bus::{EventBus, TokioEventBus};
use crate::state::{FileStateManager, StateManager, StateManagerOptions};

/// Default event bus buffer size (spec §4.2 "Defaults", reused for §4.3's
/// event bus init step).
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ProjectContextOptions {
    pub event_buffer_size: Option<usize>,
    /// Drives which config file the context's config loader points at
    /// (spec §4.3 step 2). Defaults to `ConfigMode::InheritGlobal`.
    pub config_mode: ConfigMode,
}

/// Composite owner of per-project state (spec §3, §4.3). All accessors
/// return `ContextClosed` once `close` has run.
pub struct ProjectContext {
    id: ProjectId,
    root: PathBuf,
    state_manager: Box<dyn StateManager>,
    event_bus: Box<dyn EventBus>,
    config_loader: Box<dyn ConfigLoader>,
    attachment_store: Box<dyn AttachmentStore>,
    chat_store: Box<dyn ChatStore>,
    created_at: DateTime<Utc>,
    last_accessed: Mutex<DateTime<Utc>>,
    closed: AtomicBool,
}

impl ProjectContext {
    /// Assembles a context from already-constructed collaborators. Used
    /// directly by tests wiring in fakes, and internally by `open` for the
    /// production path.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ProjectId,
        root: PathBuf,
        state_manager: Box<dyn StateManager>,
        event_bus: Box<dyn EventBus>,
        config_loader: Box<dyn ConfigLoader>,
        attachment_store: Box<dyn AttachmentStore>,
        chat_store: Box<dyn ChatStore>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            root,
            state_manager,
            event_bus,
            config_loader,
            attachment_store,
            chat_store,
            created_at: now,
            last_accessed: Mutex::new(now),
            closed: AtomicBool::new(false),
        }
    }

    /// `NewProjectContext(id, root, options)` (spec §4.3): resolves `root`,
    /// initializes each collaborator in order, and closes whatever was
    /// already built if a later step fails.
    pub async fn open(
        id: ProjectId,
        root: impl Into<PathBuf>,
        options: ProjectContextOptions,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let root = root.into();
        let quorum_dir = root.join(".quorum");
        if !quorum_dir.is_dir() {
            return Err(Error::NotQuorumProject(root));
        }

        // Spec §4.3 step 2: the config path is driven by `config_mode`, not
        // by whether a file happens to exist at the custom path yet — a
        // `Custom` project with a missing `config.yaml` is `degraded`
        // (spec §4.1), not silently rehomed onto the shared global config.
        let custom_config_path = quorum_dir.join("config.yaml");
        let config_loader = match options.config_mode {
            ConfigMode::Custom => YamlConfigLoader::new(custom_config_path, root.clone(), true),
            ConfigMode::InheritGlobal => {
                let global_path = global_config_path()?;
                if !global_path.is_file() {
                    fsutil::atomic_write(&global_path, b"{}\n")?;
                }
                YamlConfigLoader::new(global_path, root.clone(), true)
            }
        };

        let cfg = config_loader.load().await?;

        let state_path = cfg
            .state
            .path
            .clone()
            .unwrap_or_else(|| quorum_dir.join("state").join("state.db"));

        let state_manager = FileStateManager::open(
            state_path.clone(),
            StateManagerOptions {
                create_if_missing: true,
            },
        )
        .await?;

        let buffer_size = options
            .event_buffer_size
            .or(cfg.event_bus.buffer_size)
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let event_bus = TokioEventBus::new(buffer_size);

        let attachment_store = DirAttachmentStore::new(root.clone());

        let state_dir = state_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| quorum_dir.join("state"));
        let chat_store = match FileChatStore::open(state_dir.join("chat.db")).await {
            Ok(store) => store,
            Err(e) => {
                warn!(project = %id, error = %e, "closing partially initialized context after init failure");
                if let Some(closeable) = state_manager.as_closeable() {
                    let _ = closeable.close();
                }
                return Err(e);
            }
        };

        debug!(project = %id, root = %root.display(), "project context initialized");
        Ok(Self::new(
            id,
            root,
            Box::new(state_manager),
            Box::new(event_bus),
            Box::new(config_loader),
            Box::new(attachment_store),
            Box::new(chat_store),
            now,
        ))
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        *self.last_accessed.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Updates `last_accessed` under the context's own mutex (spec §4.3).
    pub fn touch(&self, now: DateTime<Utc>) {
        *self.last_accessed.lock() = now;
    }

    pub fn state_manager(&self) -> Result<&dyn StateManager> {
        self.ensure_open()?;
        Ok(self.state_manager.as_ref())
    }

    pub fn event_bus(&self) -> Result<&dyn EventBus> {
        self.ensure_open()?;
        Ok(self.event_bus.as_ref())
    }

    pub fn config_loader(&self) -> Result<&dyn ConfigLoader> {
        self.ensure_open()?;
        Ok(self.config_loader.as_ref())
    }

    pub fn attachment_store(&self) -> Result<&dyn AttachmentStore> {
        self.ensure_open()?;
        Ok(self.attachment_store.as_ref())
    }

    pub fn chat_store(&self) -> Result<&dyn ChatStore> {
        self.ensure_open()?;
        Ok(self.chat_store.as_ref())
    }

    /// Stats `root` and `.quorum`, then queries the state manager's
    /// `Exists()` (spec §4.3).
    pub async fn validate(&self) -> Result<()> {
        self.ensure_open()?;
        if !tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(Error::NotQuorumProject(self.root.clone()));
        }
        let quorum_dir = self.root.join(".quorum");
        if !tokio::fs::metadata(&quorum_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(Error::NotQuorumProject(self.root.clone()));
        }
        if !self.state_manager.exists().await? {
            return Err(Error::NotQuorumProject(self.root.clone()));
        }
        Ok(())
    }

    pub async fn has_running_workflows(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(!self.state_manager.list_running_workflows().await?.is_empty())
    }

    /// Idempotent. Closes every owned resource, collecting and joining
    /// errors rather than stopping at the first one (spec §4.3). `Close` is
    /// probed once per collaborator via the optional `Closeable` capability
    /// (spec §9 "Closeable-as-capability") and invoked only if present.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(project = %self.id, "closing project context");
        let mut errors = Vec::new();
        if let Some(closeable) = self.state_manager.as_closeable() {
            if let Err(e) = closeable.close() {
                errors.push(e.to_string());
            }
        }
        if let Err(e) = self.event_bus.close() {
            errors.push(e.to_string());
        }
        if let Some(closeable) = self.chat_store.as_closeable() {
            if let Err(e) = closeable.close() {
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Conflict(errors.join("; ")))
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ContextClosed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

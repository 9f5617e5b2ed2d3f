// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The project registry: durable store of `Project` records, their default,
//! and the path/`.quorum` validation rules that gate membership.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::RwLock;
use qm_core::{
    color_for_id, fsutil, titleize_basename, Clock, ConfigMode, Error, Project, ProjectId,
    ProjectIdGen, ProjectStatus, RegistryConfig, Result, ValidationError, REGISTRY_VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::options::AddProjectOptions;

struct Inner {
    path: PathBuf,
    projects: IndexMap<ProjectId, Project>,
    default_project: Option<ProjectId>,
    /// Ids removed this session but not yet flushed; protects against a
    /// merge-from-disk re-adding a record another process just deleted.
    removed: HashSet<ProjectId>,
    closed: bool,
}

/// Snapshot of the mutable state, captured before a mutation so it can be
/// restored if the subsequent save fails (persistence protocol step 4).
struct Snapshot {
    projects: IndexMap<ProjectId, Project>,
    default_project: Option<ProjectId>,
    removed: HashSet<ProjectId>,
}

impl Snapshot {
    fn capture(inner: &Inner) -> Self {
        Self {
            projects: inner.projects.clone(),
            default_project: inner.default_project.clone(),
            removed: inner.removed.clone(),
        }
    }
}

/// The project registry. Safe for concurrent use by many threads: one
/// `parking_lot::RwLock` guards the in-memory state, writes serialize, reads
/// proceed concurrently.
///
/// Generic over the clock so tests can supply a `FakeClock`; the id
/// generator is boxed since `ProjectIdGen` carries no `Clone` bound and
/// doesn't need one.
pub struct Registry<C: Clock> {
    inner: RwLock<Inner>,
    id_gen: Box<dyn ProjectIdGen>,
    clock: C,
    backup_enabled: bool,
}

impl<C: Clock> Registry<C> {
    /// Opens (or creates) the registry backed by the YAML file at `path`,
    /// loading any existing records.
    pub fn open(
        path: impl Into<PathBuf>,
        id_gen: impl ProjectIdGen + 'static,
        clock: C,
        backup_enabled: bool,
    ) -> Result<Self> {
        let path = path.into();
        let config = Self::read_config(&path)?;
        let mut projects = IndexMap::new();
        for p in config.projects {
            projects.insert(p.id.clone(), p);
        }
        let default_project = non_empty(config.default_project).map(ProjectId::new);
        Ok(Self {
            inner: RwLock::new(Inner {
                path,
                projects,
                default_project,
                removed: HashSet::new(),
                closed: false,
            }),
            id_gen: Box::new(id_gen),
            clock,
            backup_enabled,
        })
    }

    /// `$HOME/.quorum-registry/projects.yaml`, the default registry location.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::InvalidPath(PathBuf::from("$HOME is unset; cannot locate registry"))
        })?;
        Ok(home.join(".quorum-registry").join("projects.yaml"))
    }

    pub fn list_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        check_cancel(cancel)?;
        let inner = self.inner.read();
        Ok(inner.projects.values().cloned().collect())
    }

    pub fn get_project(&self, id: &ProjectId, cancel: &CancellationToken) -> Result<Project> {
        check_cancel(cancel)?;
        let inner = self.inner.read();
        inner
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(id.to_string()))
    }

    pub fn get_project_by_path(&self, path: &Path, cancel: &CancellationToken) -> Result<Project> {
        check_cancel(cancel)?;
        let cleaned = fsutil::clean_path(path);
        let inner = self.inner.read();
        inner
            .projects
            .values()
            .find(|p| p.path == cleaned)
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(cleaned.display().to_string()))
    }

    pub fn add_project(
        &self,
        path: &Path,
        opts: AddProjectOptions,
        cancel: &CancellationToken,
    ) -> Result<Project> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        check_closed(&inner)?;
        let snapshot = Snapshot::capture(&inner);

        let project = self.build_new_project(&inner, path, opts)?;
        inner.projects.insert(project.id.clone(), project.clone());
        inner.removed.remove(&project.id);
        if inner.default_project.is_none() {
            inner.default_project = Some(project.id.clone());
        }

        self.save_checked(&mut inner, snapshot)?;
        info!(project_id = %project.id, path = %project.path.display(), "registered project");
        Ok(project)
    }

    fn build_new_project(
        &self,
        inner: &Inner,
        path: &Path,
        opts: AddProjectOptions,
    ) -> Result<Project> {
        if !fsutil::is_absolute_and_clean(path) {
            return Err(Error::InvalidPath(path.to_path_buf()));
        }
        let quorum_dir = path.join(".quorum");
        match fs::metadata(&quorum_dir) {
            Ok(m) if m.is_dir() => {}
            _ => return Err(Error::NotQuorumProject(path.to_path_buf())),
        }
        if inner.projects.values().any(|p| p.path == path) {
            return Err(Error::ProjectAlreadyExists(path.to_path_buf()));
        }

        let id = self.id_gen.next();
        let name = opts.name.unwrap_or_else(|| titleize_basename(path));
        let color = opts.color.unwrap_or_else(|| color_for_id(&id));
        let config_mode = if quorum_dir.join("config.yaml").exists() {
            ConfigMode::Custom
        } else {
            ConfigMode::InheritGlobal
        };
        let now = self.clock.utc_now();
        Ok(Project {
            id,
            path: path.to_path_buf(),
            name,
            color,
            status: ProjectStatus::Initializing,
            status_message: None,
            config_mode,
            enabled: true,
            created_at: now,
            last_accessed: now,
        })
    }

    pub fn remove_project(&self, id: &ProjectId, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        check_closed(&inner)?;
        let snapshot = Snapshot::capture(&inner);

        if inner.projects.shift_remove(id).is_none() {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        inner.removed.insert(id.clone());
        if inner.default_project.as_ref() == Some(id) {
            inner.default_project = inner.projects.keys().next().cloned();
        }

        self.save_checked(&mut inner, snapshot)?;
        info!(project_id = %id, "removed project");
        Ok(())
    }

    pub fn update_project(&self, p: Project, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        if p.id.as_str().is_empty() {
            return Err(Error::NotFound("empty project id".into()));
        }
        let mut inner = self.inner.write();
        check_closed(&inner)?;
        let snapshot = Snapshot::capture(&inner);

        if !inner.projects.contains_key(&p.id) {
            return Err(Error::ProjectNotFound(p.id.to_string()));
        }
        let id = p.id.clone();
        inner.projects.insert(id, p);

        self.save_checked(&mut inner, snapshot)
    }

    pub fn validate_project(
        &self,
        id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<ProjectStatus> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        check_closed(&inner)?;
        let snapshot = Snapshot::capture(&inner);

        let (path, config_mode) = match inner.projects.get(id) {
            Some(p) => (p.path.clone(), p.config_mode),
            None => return Err(Error::ProjectNotFound(id.to_string())),
        };
        let (status, message, offline_cause) = assess_project(&path, config_mode);

        if let Some(entry) = inner.projects.get_mut(id) {
            entry.status = status;
            entry.status_message = message.clone();
        }
        self.save_checked(&mut inner, snapshot)?;

        match offline_cause {
            Some(reason) => Err(Error::ProjectOffline(ValidationError {
                project_id: id.to_string(),
                path,
                reason,
                cause: None,
            })),
            None => Ok(status),
        }
    }

    /// Validates every project, continuing through failures. Returns the
    /// last error encountered, if any.
    pub fn validate_all(&self, cancel: &CancellationToken) -> Result<()> {
        let ids: Vec<ProjectId> = self
            .list_projects(cancel)?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let mut last_err = None;
        for id in ids {
            if let Err(e) = self.validate_project(&id, cancel) {
                warn!(project_id = %id, error = %e, "project validation failed");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn get_default_project(&self, cancel: &CancellationToken) -> Result<Project> {
        check_cancel(cancel)?;
        let inner = self.inner.read();
        if inner.projects.is_empty() {
            return Err(Error::NoDefaultProject);
        }
        if let Some(id) = &inner.default_project {
            if let Some(p) = inner.projects.get(id) {
                return Ok(p.clone());
            }
        }
        inner
            .projects
            .values()
            .next()
            .cloned()
            .ok_or(Error::NoDefaultProject)
    }

    pub fn set_default_project(&self, id: &ProjectId, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        check_closed(&inner)?;
        let snapshot = Snapshot::capture(&inner);

        if !inner.projects.contains_key(id) {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        inner.default_project = Some(id.clone());

        self.save_checked(&mut inner, snapshot)
    }

    pub fn touch_project(&self, id: &ProjectId, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        check_closed(&inner)?;
        let snapshot = Snapshot::capture(&inner);

        let now = self.clock.utc_now();
        match inner.projects.get_mut(id) {
            Some(p) => p.last_accessed = now,
            None => return Err(Error::ProjectNotFound(id.to_string())),
        }

        self.save_checked(&mut inner, snapshot)
    }

    /// Re-reads the registry from disk, discarding any unsaved in-memory
    /// state and the pending removed-set.
    pub fn reload(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        check_closed(&inner)?;

        let config = Self::read_config(&inner.path)?;
        let mut projects = IndexMap::new();
        for p in config.projects {
            projects.insert(p.id.clone(), p);
        }
        inner.projects = projects;
        inner.default_project = non_empty(config.default_project).map(ProjectId::new);
        inner.removed.clear();
        debug!(path = %inner.path.display(), "registry reloaded");
        Ok(())
    }

    /// Flushes once and marks the registry closed. Idempotent.
    pub fn close(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        let snapshot = Snapshot::capture(&inner);
        self.save_checked(&mut inner, snapshot)?;
        inner.closed = true;
        Ok(())
    }

    fn read_config(path: &Path) -> Result<RegistryConfig> {
        if !path.exists() {
            return Ok(RegistryConfig::default());
        }
        let bytes = fs::read(path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(RegistryConfig::default());
        }
        serde_yaml::from_slice(&bytes).map_err(|e| Error::RegistryCorrupted(e.to_string()))
    }

    /// Persistence protocol (spec'd order): merge-from-disk, optional
    /// backup, atomic write. Callers are responsible for rolling the
    /// in-memory state back to a captured `Snapshot` if this errors.
    fn save(&self, inner: &mut Inner) -> Result<()> {
        let disk = Self::read_config(&inner.path)?;
        for p in disk.projects {
            if !inner.projects.contains_key(&p.id) && !inner.removed.contains(&p.id) {
                inner.projects.insert(p.id.clone(), p);
            }
        }

        if self.backup_enabled {
            fsutil::backup(&inner.path)?;
        }

        let config = RegistryConfig {
            version: REGISTRY_VERSION,
            default_project: inner
                .default_project
                .as_ref()
                .map(|i| i.to_string())
                .unwrap_or_default(),
            projects: inner.projects.values().cloned().collect(),
        };
        let yaml = serde_yaml::to_string(&config)?;
        fsutil::atomic_write(&inner.path, yaml.as_bytes())?;
        inner.removed.clear();
        Ok(())
    }

    fn save_checked(&self, inner: &mut Inner, snapshot: Snapshot) -> Result<()> {
        match self.save(inner) {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.projects = snapshot.projects;
                inner.default_project = snapshot.default_project;
                inner.removed = snapshot.removed;
                Err(Error::persistence("save", e))
            }
        }
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn check_closed(inner: &Inner) -> Result<()> {
    if inner.closed {
        Err(Error::RegistryClosed)
    } else {
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Stats `root`, then `.quorum`, then `.quorum/config.yaml`, returning the
/// resulting status/message and, for offline transitions, the reason the
/// caller should surface as a `ValidationError`.
fn assess_project(
    root: &Path,
    config_mode: ConfigMode,
) -> (ProjectStatus, Option<String>, Option<String>) {
    match fs::metadata(root) {
        Ok(m) if m.is_dir() => {}
        Ok(_) => {
            let reason = "project root is not a directory".to_string();
            return (ProjectStatus::Offline, Some(reason.clone()), Some(reason));
        }
        Err(e) => {
            let reason = format!("project root is inaccessible: {e}");
            return (ProjectStatus::Offline, Some(reason.clone()), Some(reason));
        }
    }

    let quorum_dir = root.join(".quorum");
    match fs::metadata(&quorum_dir) {
        Ok(m) if m.is_dir() => {}
        _ => {
            let reason = ".quorum directory is missing".to_string();
            return (ProjectStatus::Offline, Some(reason.clone()), Some(reason));
        }
    }

    if quorum_dir.join("config.yaml").exists() {
        return (ProjectStatus::Healthy, None, None);
    }
    match config_mode {
        ConfigMode::Custom => (
            ProjectStatus::Degraded,
            Some("config.yaml missing".to_string()),
            None,
        ),
        ConfigMode::InheritGlobal => (ProjectStatus::Healthy, None, None),
    }
}

/// Path-only validator used by callers that haven't yet registered a
/// project: fails unless `p` is absolute, already clean, and `p/.quorum`
/// exists as a directory.
pub fn validate_project_path(p: &Path) -> Result<()> {
    if !fsutil::is_absolute_and_clean(p) {
        return Err(Error::InvalidPath(p.to_path_buf()));
    }
    let quorum_dir = p.join(".quorum");
    match fs::metadata(&quorum_dir) {
        Ok(m) if m.is_dir() => Ok(()),
        _ => Err(Error::NotQuorumProject(p.to_path_buf())),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Import` (spec §4.5): restore a snapshot archive into a destination
//! registry, merging or replacing, resolving per-project and global-config
//! conflicts, and restoring project files.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use qm_core::{
    fsutil, ConflictAction, Error, Project, ProjectId, ProjectIdGen, RegistryConfig, Result,
};
use tokio_util::sync::CancellationToken;

use crate::archive::{check_cancel, load_archive, normalize_mode, write_with_mode, GLOBAL_CONFIG_ENTRY};
use crate::manifest::ProjectEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Merge into whatever is already at `registry_path`.
    Merge,
    /// Discard the destination registry's existing contents entirely.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Skip,
    Overwrite,
    Fail,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub conflict_policy: ConflictPolicy,
    /// Keep each project's archived id rather than minting a fresh one.
    pub preserve_project_ids: bool,
    pub include_worktrees: bool,
    /// Compute the full restore plan and report without writing anything.
    pub dry_run: bool,
    /// Remaps an archived project's recorded path to a different
    /// destination path before conflict resolution.
    pub path_map: HashMap<PathBuf, PathBuf>,
    /// Where to write the archive's global config file, if it has one.
    /// `None` skips global config restoration entirely.
    pub global_config_dest_path: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::Merge,
            conflict_policy: ConflictPolicy::Fail,
            preserve_project_ids: false,
            include_worktrees: false,
            dry_run: false,
            path_map: HashMap::new(),
            global_config_dest_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectImportOutcome {
    pub source_id: ProjectId,
    pub target_id: ProjectId,
    pub target_path: PathBuf,
    pub action: ConflictAction,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub projects: Vec<ProjectImportOutcome>,
    pub global_config_action: Option<ConflictAction>,
}

/// Restores the archive read from `reader` into the registry file at
/// `registry_path`, per `opts`.
pub fn import<R: Read>(
    registry_path: &Path,
    id_gen: &dyn ProjectIdGen,
    reader: R,
    opts: &ImportOptions,
    cancel: &CancellationToken,
) -> Result<ImportReport> {
    check_cancel(cancel)?;
    let contents = load_archive(reader)?;
    let manifest = &contents.manifest;

    let mut dest = match opts.mode {
        ImportMode::Replace => RegistryConfig::default(),
        ImportMode::Merge => read_registry_config(registry_path)?,
    };

    let mut report = ImportReport {
        projects: Vec::new(),
        global_config_action: None,
    };
    let mut id_map: HashMap<ProjectId, ProjectId> = HashMap::new();

    for entry in &manifest.projects {
        check_cancel(cancel)?;
        let target_path = resolve_target_path(entry, &opts.path_map)?;
        resolve_project(entry, target_path, id_gen, opts, &mut dest, &mut id_map, &mut report)?;
    }

    if let Some(bytes) = contents.files.get(GLOBAL_CONFIG_ENTRY) {
        if let Some(dest_path) = &opts.global_config_dest_path {
            report.global_config_action =
                Some(apply_global_config(dest_path, bytes, opts)?);
        }
    }

    resolve_default_project(manifest.default_project.as_ref(), &id_map, opts.mode, &mut dest);

    restore_project_files(&contents.files, manifest, &report, opts)?;

    if !opts.dry_run {
        let yaml = serde_yaml::to_string(&dest)?;
        fsutil::atomic_write(registry_path, yaml.as_bytes())?;
    }

    Ok(report)
}

fn read_registry_config(path: &Path) -> Result<RegistryConfig> {
    if !path.exists() {
        return Ok(RegistryConfig::default());
    }
    let bytes = fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RegistryConfig::default());
    }
    serde_yaml::from_slice(&bytes).map_err(|e| Error::RegistryCorrupted(e.to_string()))
}

fn resolve_target_path(entry: &ProjectEntry, path_map: &HashMap<PathBuf, PathBuf>) -> Result<PathBuf> {
    let raw = path_map.get(&entry.path).cloned().unwrap_or_else(|| entry.path.clone());
    if raw.as_os_str().is_empty() {
        return Err(Error::InvalidPath(raw));
    }
    Ok(fsutil::clean_path(&raw))
}

/// Applies one project entry's conflict-resolution rule (spec §4.5 Import
/// step 3): same path+id updates in place; same path (or, when
/// `preserve_project_ids`, same id) with different identity is a conflict
/// governed by `conflict_policy`; no match adds a new record.
#[allow(clippy::too_many_arguments)]
fn resolve_project(
    entry: &ProjectEntry,
    target_path: PathBuf,
    id_gen: &dyn ProjectIdGen,
    opts: &ImportOptions,
    dest: &mut RegistryConfig,
    id_map: &mut HashMap<ProjectId, ProjectId>,
    report: &mut ImportReport,
) -> Result<()> {
    let same_identity = dest
        .projects
        .iter()
        .position(|p| p.id == entry.id && p.path == target_path);
    let conflict = same_identity.or_else(|| {
        dest.projects
            .iter()
            .position(|p| p.path == target_path || (opts.preserve_project_ids && p.id == entry.id))
    });

    let (action, final_id) = if let Some(idx) = same_identity {
        let final_id = entry.id.clone();
        dest.projects[idx] = project_from_entry(entry, final_id.clone(), target_path.clone());
        (ConflictAction::Updated, final_id)
    } else if let Some(idx) = conflict {
        match opts.conflict_policy {
            ConflictPolicy::Fail => {
                return Err(Error::Conflict(format!(
                    "project conflict at {}",
                    target_path.display()
                )))
            }
            ConflictPolicy::Skip => {
                report.projects.push(ProjectImportOutcome {
                    source_id: entry.id.clone(),
                    target_id: dest.projects[idx].id.clone(),
                    target_path: dest.projects[idx].path.clone(),
                    action: ConflictAction::Skipped,
                });
                return Ok(());
            }
            ConflictPolicy::Overwrite => {
                let final_id = dest.projects[idx].id.clone();
                dest.projects[idx] = project_from_entry(entry, final_id.clone(), target_path.clone());
                (ConflictAction::Overwritten, final_id)
            }
        }
    } else {
        let final_id = if opts.preserve_project_ids {
            entry.id.clone()
        } else {
            fresh_id(id_gen, &dest.projects)
        };
        dest.projects.push(project_from_entry(entry, final_id.clone(), target_path.clone()));
        (ConflictAction::Added, final_id)
    };

    id_map.insert(entry.id.clone(), final_id.clone());
    report.projects.push(ProjectImportOutcome {
        source_id: entry.id.clone(),
        target_id: final_id,
        target_path,
        action,
    });
    Ok(())
}

fn fresh_id(id_gen: &dyn ProjectIdGen, existing: &[Project]) -> ProjectId {
    loop {
        let candidate = id_gen.next();
        if !existing.iter().any(|p| p.id == candidate) {
            return candidate;
        }
    }
}

fn project_from_entry(entry: &ProjectEntry, id: ProjectId, path: PathBuf) -> Project {
    Project {
        id,
        path,
        name: entry.name.clone(),
        color: entry.color.clone(),
        status: entry.status,
        status_message: None,
        config_mode: entry.config_mode,
        enabled: true,
        created_at: entry.created_at,
        last_accessed: entry.last_accessed,
    }
}

fn apply_global_config(dest_path: &Path, bytes: &[u8], opts: &ImportOptions) -> Result<ConflictAction> {
    if !dest_path.is_file() {
        if !opts.dry_run {
            fsutil::atomic_write(dest_path, bytes)?;
        }
        return Ok(ConflictAction::Added);
    }
    match opts.conflict_policy {
        ConflictPolicy::Fail => Err(Error::Conflict(format!(
            "global config conflict at {}",
            dest_path.display()
        ))),
        ConflictPolicy::Skip => Ok(ConflictAction::Skipped),
        ConflictPolicy::Overwrite => {
            if !opts.dry_run {
                fsutil::atomic_write(dest_path, bytes)?;
            }
            Ok(ConflictAction::Overwritten)
        }
    }
}

/// Reassigns the destination default (spec §4.5 Import step 6): `Replace`
/// always takes the archive's default (remapped); `Merge` only fills in a
/// default if the destination doesn't already have one.
fn resolve_default_project(
    source_default: Option<&ProjectId>,
    id_map: &HashMap<ProjectId, ProjectId>,
    mode: ImportMode,
    dest: &mut RegistryConfig,
) {
    if mode == ImportMode::Merge && !dest.default_project.is_empty() {
        return;
    }
    if let Some(mapped) = source_default.and_then(|id| id_map.get(id)) {
        dest.default_project = mapped.to_string();
    }
}

/// Restores archived project files (spec §4.5 Import step 5): skips
/// `registry/*` entries (handled separately above) and files belonging to
/// a project whose import was skipped, rejects any destination that
/// escapes the project's resolved root, and applies the same conflict
/// policy used for project records to pre-existing files.
// Every path in `manifest.files` was already confirmed present in `files`
// by `load_archive`'s checksum pass.
#[allow(clippy::expect_used)]
fn restore_project_files(
    files: &HashMap<String, Vec<u8>>,
    manifest: &crate::manifest::Manifest,
    report: &ImportReport,
    opts: &ImportOptions,
) -> Result<()> {
    for file in &manifest.files {
        let Some(rest) = file.path.strip_prefix("projects/") else {
            continue;
        };
        let (source_id_str, rel) = rest
            .split_once('/')
            .ok_or_else(|| Error::RegistryCorrupted(format!("malformed archive path: {}", file.path)))?;
        if !opts.include_worktrees && rel.starts_with(".worktrees/") {
            continue;
        }
        let source_id = ProjectId::new(source_id_str);
        let Some(outcome) = report
            .projects
            .iter()
            .find(|o| o.source_id == source_id && o.action != ConflictAction::Skipped)
        else {
            continue;
        };

        let cleaned_rel = fsutil::clean_archive_path(rel)?;
        let dest_path = outcome.target_path.join(&cleaned_rel);
        if !dest_path.starts_with(&outcome.target_path) {
            return Err(Error::InvalidPath(dest_path));
        }

        let bytes = files
            .get(&file.path)
            .expect("load_archive already verified every manifest entry exists");

        if dest_path.is_file() {
            match opts.conflict_policy {
                ConflictPolicy::Fail => {
                    return Err(Error::Conflict(format!("file conflict at {}", dest_path.display())))
                }
                ConflictPolicy::Skip => continue,
                ConflictPolicy::Overwrite => {}
            }
        }

        if !opts.dry_run {
            write_with_mode(&dest_path, bytes, normalize_mode(file.mode))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Export` (spec §4.5): build a subset registry and stream a tar+gzip
//! archive containing it, an optional global config, and every selected
//! project's `.quorum` (and optionally `.worktrees`) tree.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use qm_core::{fsutil, Clock, Error, Project, ProjectId, RegistryConfig, Result, REGISTRY_VERSION};
use qm_registry::Registry;
use tokio_util::sync::CancellationToken;

use crate::archive::{append_entry, check_cancel, file_mode, gz_builder, GLOBAL_CONFIG_ENTRY, MANIFEST_ENTRY, REGISTRY_ENTRY};
use crate::manifest::{FileEntry, Manifest, ProjectEntry, MANIFEST_VERSION};

/// What to include in an exported snapshot.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// `None` exports every registered project; `Some` exports exactly
    /// those ids, failing if any is unknown to the registry.
    pub project_ids: Option<Vec<ProjectId>>,
    pub include_worktrees: bool,
    /// Caller-resolved path to the global config file, if one should be
    /// included. The snapshot engine treats its contents as opaque bytes
    /// and never resolves this path itself (spec §6 `GlobalConfigPath`'s
    /// "owned by the config-loader collaborator" contract).
    pub global_config_path: Option<PathBuf>,
}

/// Streams a snapshot archive for `registry`'s selected projects to
/// `writer`, returning the manifest that was embedded in it.
pub fn export<C: Clock, W: Write>(
    registry: &Registry<C>,
    writer: W,
    opts: &ExportOptions,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Manifest> {
    check_cancel(cancel)?;
    let all = registry.list_projects(cancel)?;
    let mut selected = select_projects(&all, opts.project_ids.as_deref())?;
    selected.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    let default_project = resolve_default_in_selection(registry, &selected, cancel);

    let mut tar = gz_builder(writer);
    let mut files = Vec::new();

    let subset = RegistryConfig {
        version: REGISTRY_VERSION,
        default_project: default_project
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        projects: selected.clone(),
    };
    let registry_yaml = serde_yaml::to_string(&subset)?;
    files.push(append_entry(&mut tar, REGISTRY_ENTRY, registry_yaml.as_bytes(), 0o600)?);

    if let Some(path) = &opts.global_config_path {
        if path.is_file() {
            let bytes = fs::read(path)?;
            let mode = file_mode(path)?;
            files.push(append_entry(&mut tar, GLOBAL_CONFIG_ENTRY, &bytes, mode)?);
        }
    }

    for project in &selected {
        check_cancel(cancel)?;
        append_project_tree(&mut tar, project, opts.include_worktrees, &mut files)?;
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        created_at: now,
        include_worktrees: opts.include_worktrees,
        default_project,
        projects: selected.iter().map(ProjectEntry::from).collect(),
        files,
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
    append_entry(&mut tar, MANIFEST_ENTRY, &manifest_bytes, 0o600)?;

    let gz = tar.into_inner()?;
    gz.finish()?;
    Ok(manifest)
}

fn select_projects(all: &[Project], ids: Option<&[ProjectId]>) -> Result<Vec<Project>> {
    match ids {
        None => Ok(all.to_vec()),
        Some(ids) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                match all.iter().find(|p| &p.id == id) {
                    Some(p) => out.push(p.clone()),
                    None => return Err(Error::ProjectNotFound(id.to_string())),
                }
            }
            Ok(out)
        }
    }
}

/// The registry's resolved default (which already implements the
/// "stale pointer falls back to the first remaining project" rule) is used
/// rather than reaching into the registry's private state; it's preserved
/// in the manifest only if it falls within the export selection.
fn resolve_default_in_selection<C: Clock>(
    registry: &Registry<C>,
    selected: &[Project],
    cancel: &CancellationToken,
) -> Option<ProjectId> {
    match registry.get_default_project(cancel) {
        Ok(p) if selected.iter().any(|s| s.id == p.id) => Some(p.id),
        _ => None,
    }
}

fn append_project_tree<W: Write>(
    tar: &mut tar::Builder<W>,
    project: &Project,
    include_worktrees: bool,
    files: &mut Vec<FileEntry>,
) -> Result<()> {
    append_subtree(tar, &project.id, &project.path, ".quorum", files)?;
    if include_worktrees {
        append_subtree(tar, &project.id, &project.path, ".worktrees", files)?;
    }
    Ok(())
}

// `path` is always produced by walking under `project_root`, so stripping
// that prefix cannot fail.
#[allow(clippy::expect_used)]
fn append_subtree<W: Write>(
    tar: &mut tar::Builder<W>,
    id: &ProjectId,
    project_root: &Path,
    subdir: &str,
    files: &mut Vec<FileEntry>,
) -> Result<()> {
    let root = project_root.join(subdir);
    if !root.is_dir() {
        return Ok(());
    }
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(path);
            } else if meta.is_file() {
                let rel = path
                    .strip_prefix(project_root)
                    .expect("walked path is under project_root");
                let raw = rel.to_string_lossy().replace('\\', "/");
                let archive_rel = fsutil::clean_archive_path(&raw)?;
                let archive_path = format!("projects/{}/{}", id.as_str(), archive_rel);
                let bytes = fs::read(&path)?;
                let mode = file_mode(&path)?;
                files.push(append_entry(tar, &archive_path, &bytes, mode)?);
            }
            // Symlinks, sockets, and other non-regular entries are skipped.
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;

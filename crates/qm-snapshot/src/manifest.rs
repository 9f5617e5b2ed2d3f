// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The snapshot manifest data model (spec §3, §6): `Manifest`, `ProjectEntry`,
//! `FileEntry`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use qm_core::{ConfigMode, Project, ProjectId, ProjectStatus};
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;

/// A snapshot archive's table of contents: `manifest.json` at the archive
/// root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub include_worktrees: bool,
    #[serde(default)]
    pub default_project: Option<ProjectId>,
    pub projects: Vec<ProjectEntry>,
    pub files: Vec<FileEntry>,
}

/// A project record captured at export time: the same fields `Project`
/// carries in the registry, plus the source path an importer's `path_map`
/// keys off of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub id: ProjectId,
    pub path: PathBuf,
    pub name: String,
    pub color: String,
    pub status: ProjectStatus,
    pub config_mode: ConfigMode,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl From<&Project> for ProjectEntry {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id.clone(),
            path: p.path.clone(),
            name: p.name.clone(),
            color: p.color.clone(),
            status: p.status,
            config_mode: p.config_mode,
            created_at: p.created_at,
            last_accessed: p.last_accessed,
        }
    }
}

/// One archived file's bookkeeping record: archive-relative path, content
/// hash, size, and POSIX mode bits. `mode` is `u64` on the wire so a
/// corrupted or hostile manifest claiming a value outside `u32`'s range is
/// representable (and rejected/coerced, see `archive::normalize_mode`)
/// rather than failing deserialization outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
    pub mode: u64,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The registry's durable data model: `Project` and `RegistryConfig` (spec §3).

use crate::id::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Health/lifecycle status of a registered project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Healthy,
    Degraded,
    Offline,
    Initializing,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Initializing
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectStatus::Healthy => "healthy",
            ProjectStatus::Degraded => "degraded",
            ProjectStatus::Offline => "offline",
            ProjectStatus::Initializing => "initializing",
        };
        write!(f, "{s}")
    }
}

/// Whether a project's config is loaded from its own `.quorum/config.yaml`
/// or inherited from the global config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigMode {
    InheritGlobal,
    Custom,
}

impl Default for ConfigMode {
    fn default() -> Self {
        ConfigMode::InheritGlobal
    }
}

/// A durable registry record for one project (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub path: PathBuf,
    pub name: String,
    pub color: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    pub config_mode: ConfigMode,
    /// Tri-state: absent on disk means enabled. Always populated once in memory.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

/// Fixed palette used to derive a project's display color deterministically
/// from its id (spec §4.1: "deterministic hash of id mod a fixed palette").
pub const COLOR_PALETTE: &[&str] = &[
    "red", "orange", "amber", "green", "teal", "cyan", "blue", "indigo", "violet", "pink",
    "rose", "slate",
];

/// Deterministically derive a display color for a project id.
pub fn color_for_id(id: &ProjectId) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.as_str().hash(&mut hasher);
    let idx = (hasher.finish() as usize) % COLOR_PALETTE.len();
    COLOR_PALETTE[idx].to_string()
}

/// Titleize a path's basename into a display name: replace `-`/`_` with
/// spaces and capitalize each word (spec §4.1).
pub fn titleize_basename(path: &std::path::Path) -> String {
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project");
    base.split(|c| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// On-disk form of the registry (spec §3, §6): `version`, `default_project`,
/// and the list of projects. Serialized as YAML; unknown fields tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub version: u32,
    #[serde(default)]
    pub default_project: String,
    #[serde(default)]
    pub projects: Vec<Project>,
}

pub const REGISTRY_VERSION: u32 = 1;

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            default_project: String::new(),
            projects: Vec::new(),
        }
    }
}

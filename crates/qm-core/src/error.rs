// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error type and the boundary error-code mapping (spec §6).

use std::path::PathBuf;
use thiserror::Error;

/// A structured validation failure: a project's directory or config is
/// missing or unreadable. Carries enough context for callers (and tests) to
/// distinguish the cause without parsing message strings.
#[derive(Debug, Clone, Error)]
#[error("project {project_id} at {path}: {reason}")]
pub struct ValidationError {
    pub project_id: String,
    pub path: PathBuf,
    pub reason: String,
    pub cause: Option<String>,
}

/// A single outcome in an import report (spec §4.5, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    Added,
    Updated,
    Overwritten,
    Skipped,
}

/// Errors shared across the registry, pool, control plane, and snapshot engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project already registered at path: {0}")]
    ProjectAlreadyExists(PathBuf),

    #[error("not a quorum project (missing .quorum directory): {0}")]
    NotQuorumProject(PathBuf),

    #[error("project offline: {0}")]
    ProjectOffline(#[from] ValidationError),

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("registry corrupted: {0}")]
    RegistryCorrupted(String),

    #[error("no default project")]
    NoDefaultProject,

    #[error("registry is closed")]
    RegistryClosed,

    #[error("pool is closed")]
    PoolClosed,

    #[error("project context is closed")]
    ContextClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{op} failed: {source}")]
    Persistence {
        op: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Returns the boundary error identifier from spec §6, for test assertions
    /// and for external callers that key off of a stable code rather than a
    /// message string.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Error::ProjectAlreadyExists(_) => "PROJECT_ALREADY_EXISTS",
            Error::NotQuorumProject(_) => "NOT_QUORUM_PROJECT",
            Error::ProjectOffline(_) => "PROJECT_OFFLINE",
            Error::InvalidPath(_) => "INVALID_PATH",
            Error::RegistryCorrupted(_) => "REGISTRY_CORRUPTED",
            Error::NoDefaultProject => "NO_DEFAULT_PROJECT",
            Error::RegistryClosed => "REGISTRY_CLOSED",
            Error::PoolClosed => "POOL_CLOSED",
            Error::ContextClosed => "CONTEXT_CLOSED",
            Error::Cancelled => "CANCELLED",
            Error::Conflict(_) => "CONFLICT",
            Error::Persistence { .. } => "PERSISTENCE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Yaml(_) => "REGISTRY_CORRUPTED",
            Error::Json(_) => "REGISTRY_CORRUPTED",
            Error::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Wraps this error with an operation tag (`load`, `save`, `import`, `export`),
    /// per spec §7's persistence error policy.
    pub fn persistence(op: &'static str, source: Error) -> Error {
        Error::Persistence {
            op,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

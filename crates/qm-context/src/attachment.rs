// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AttachmentStore` collaborator (spec §4.3, §6): a filesystem-rooted
//! store for project attachments. No attachment layout is prescribed — this
//! is a thin, schema-free implementation of the interface contract.

use std::path::PathBuf;

use async_trait::async_trait;
use qm_core::{fsutil, Error, Result};

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn write(&self, relative_path: &str, data: &[u8]) -> Result<()>;
    async fn read(&self, relative_path: &str) -> Result<Vec<u8>>;
    async fn list(&self) -> Result<Vec<String>>;
    async fn delete(&self, relative_path: &str) -> Result<()>;
}

/// Stores attachments as plain files under `root`. `relative_path` is
/// validated with the same archive-path cleaning rule the snapshot engine
/// uses, rejecting traversal outside `root`.
pub struct DirAttachmentStore {
    root: PathBuf,
}

impl DirAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let cleaned = fsutil::clean_archive_path(relative_path)?;
        Ok(self.root.join(cleaned))
    }
}

#[async_trait]
impl AttachmentStore for DirAttachmentStore {
    async fn write(&self, relative_path: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(relative_path)?;
        fsutil::atomic_write(&path, data)
    }

    async fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative_path)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(relative_path.to_string())
            } else {
                Error::Io(e)
            }
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in walk(&self.root, &self.root) {
            out.push(entry);
        }
        out.sort();
        Ok(out)
    }

    async fn delete(&self, relative_path: &str) -> Result<()> {
        let path = self.resolve(relative_path)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn walk(root: &std::path::Path, dir: &std::path::Path) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk(root, &path));
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    out
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeAttachmentStore {
        files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    }

    impl FakeAttachmentStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl AttachmentStore for FakeAttachmentStore {
        async fn write(&self, relative_path: &str, data: &[u8]) -> Result<()> {
            fsutil::clean_archive_path(relative_path)?;
            self.files.lock().insert(relative_path.to_string(), data.to_vec());
            Ok(())
        }

        async fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
            self.files
                .lock()
                .get(relative_path)
                .cloned()
                .ok_or_else(|| Error::NotFound(relative_path.to_string()))
        }

        async fn list(&self) -> Result<Vec<String>> {
            Ok(self.files.lock().keys().cloned().collect())
        }

        async fn delete(&self, relative_path: &str) -> Result<()> {
            self.files.lock().remove(relative_path);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "attachment_tests.rs"]
mod tests;

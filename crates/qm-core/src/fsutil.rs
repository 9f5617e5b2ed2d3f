// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence helpers shared by the registry and the snapshot engine:
//! atomic write-and-rename, directory creation, checksums, and clean-path
//! validation (spec §2 "Persistence Helpers", §4.1, §4.5).

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Write `contents` to `path` atomically: write to a sibling `.tmp` file,
/// `sync_all`, then rename over the destination. A failed rename removes the
/// temp file (spec §4.1 persistence protocol step 3).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(path);

    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(contents)?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Copy `path` to `<path>.bak` if `path` exists. Used for registry backups
/// before each save (spec §4.1 step 2).
pub fn backup(path: &Path) -> Result<()> {
    if path.exists() {
        fs::copy(path, path.with_extension("bak"))?;
    }
    Ok(())
}

/// Validate that `p` is absolute and already clean (no `.`/`..`/redundant
/// separators), per spec §4.1 `ValidateProjectPath`'s path half. The
/// `.quorum` directory check is layered on by callers that have registry
/// context for the error type they want to raise.
pub fn is_absolute_and_clean(p: &Path) -> bool {
    p.is_absolute() && p == clean_path(p)
}

/// Lexically clean a path the way `path.Clean` does in the reference
/// implementation: collapse `.` segments, resolve `..` where possible,
/// without touching the filesystem.
pub fn clean_path(p: &Path) -> PathBuf {
    use std::path::Component;
    let mut out: Vec<Component> = Vec::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.into_iter().collect()
}

/// Validate and clean an archive entry path (spec §4.5, §6): must be
/// relative, forward-slash, never containing `..` traversal or an absolute
/// prefix.
pub fn clean_archive_path(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(Error::InvalidPath(PathBuf::from(raw)));
    }
    if raw.starts_with('/') || raw.contains('\\') {
        return Err(Error::InvalidPath(PathBuf::from(raw)));
    }
    let mut out: Vec<&str> = Vec::new();
    for seg in raw.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return Err(Error::InvalidPath(PathBuf::from(raw))),
            seg => out.push(seg),
        }
    }
    if out.is_empty() {
        return Err(Error::InvalidPath(PathBuf::from(raw)));
    }
    Ok(out.join("/"))
}

/// SHA-256 checksum of a byte slice, as a lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

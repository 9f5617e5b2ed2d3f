// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared tar/gzip plumbing for `export` and `import` (spec §4.5): writing
//! an entry with its `FileEntry` bookkeeping, reading one back, and the
//! mode-bits coercion rule applied to untrusted manifest data.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use qm_core::{fsutil, Error, Result};
use tokio_util::sync::CancellationToken;

use crate::manifest::{FileEntry, Manifest, MANIFEST_VERSION};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const REGISTRY_ENTRY: &str = "registry/projects.yaml";
pub const GLOBAL_CONFIG_ENTRY: &str = "registry/global-config.yaml";

/// Appends one entry to the archive and returns its `FileEntry` record.
pub fn append_entry<W: Write>(
    tar: &mut tar::Builder<W>,
    archive_path: &str,
    data: &[u8],
    mode: u32,
) -> Result<FileEntry> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    tar.append_data(&mut header, archive_path, data)?;
    Ok(FileEntry {
        path: archive_path.to_string(),
        sha256: fsutil::sha256_hex(data),
        size: data.len() as u64,
        mode: mode as u64,
    })
}

/// The unpacked contents of a snapshot archive: the parsed manifest plus
/// every regular-file entry's raw bytes, keyed by archive path.
pub struct ArchiveContents {
    pub manifest: Manifest,
    pub files: HashMap<String, Vec<u8>>,
}

/// Reads and validates an archive (spec §4.5 Validation): iterates tar
/// entries (regular files only — directories, symlinks, and other typeflags
/// are silently skipped rather than rejected, since they carry no manifest
/// bookkeeping to check), requires `manifest.json` at version 1 and
/// `registry/projects.yaml` to be present, and verifies every `FileEntry`'s
/// recorded size and SHA-256 against the archived bytes.
pub fn load_archive<R: Read>(reader: R) -> Result<ArchiveContents> {
    let gz = GzDecoder::new(reader);
    let mut archive = tar::Archive::new(gz);
    let mut files = HashMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        files.insert(path, buf);
    }

    let manifest_bytes = files
        .get(MANIFEST_ENTRY)
        .ok_or_else(|| Error::RegistryCorrupted("archive is missing manifest.json".into()))?;
    let manifest: Manifest = serde_json::from_slice(manifest_bytes)
        .map_err(|e| Error::RegistryCorrupted(format!("malformed manifest.json: {e}")))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(Error::RegistryCorrupted(format!(
            "unsupported manifest version {}",
            manifest.version
        )));
    }
    if !files.contains_key(REGISTRY_ENTRY) {
        return Err(Error::RegistryCorrupted(
            "archive is missing registry/projects.yaml".into(),
        ));
    }
    let global_config_referenced = manifest.files.iter().any(|f| f.path == GLOBAL_CONFIG_ENTRY);
    if global_config_referenced && !files.contains_key(GLOBAL_CONFIG_ENTRY) {
        return Err(Error::RegistryCorrupted(
            "manifest references a global config entry the archive doesn't contain".into(),
        ));
    }

    for entry in &manifest.files {
        let bytes = files.get(&entry.path).ok_or_else(|| {
            Error::RegistryCorrupted(format!("manifest entry missing from archive: {}", entry.path))
        })?;
        if bytes.len() as u64 != entry.size || fsutil::sha256_hex(bytes) != entry.sha256 {
            return Err(Error::RegistryCorrupted(format!(
                "checksum mismatch for archived file: {}",
                entry.path
            )));
        }
    }

    Ok(ArchiveContents {
        manifest,
        files,
    })
}

pub fn gz_builder<W: Write>(writer: W) -> tar::Builder<GzEncoder<W>> {
    tar::Builder::new(GzEncoder::new(writer, Compression::default()))
}

/// Applies the mode-coercion rule from spec §4.5: 0 means "no mode was
/// recorded, use the default"; anything that doesn't fit in a `u32`'s worth
/// of POSIX mode bits is untrustworthy and coerced to the same default
/// rather than propagated. Valid values are masked to the 12 permission
/// bits `tar`/`chmod` care about.
pub fn normalize_mode(raw: u64) -> u32 {
    const DEFAULT_MODE: u32 = 0o600;
    if raw == 0 || raw > u32::MAX as u64 {
        DEFAULT_MODE
    } else {
        (raw as u32) & 0o7777
    }
}

/// Best-effort POSIX mode bits for a file on disk; `0o644` on platforms
/// without them.
pub fn file_mode(path: &Path) -> Result<u32> {
    let meta = std::fs::metadata(path)?;
    Ok(platform_mode(&meta))
}

#[cfg(unix)]
fn platform_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn platform_mode(_meta: &std::fs::Metadata) -> u32 {
    0o644
}

/// Writes `bytes` to `path` and applies `mode` where the platform supports
/// it, creating parent directories first.
pub fn write_with_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    set_platform_mode(path, mode)
}

#[cfg(unix)]
fn set_platform_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_platform_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

pub fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;

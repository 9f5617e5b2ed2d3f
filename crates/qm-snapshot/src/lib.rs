// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qm-snapshot: the snapshot engine (spec §4.5) — export a subset of the
//! registry plus selected projects' on-disk state into a single tar+gzip
//! archive, validate one, and import it back with conflict resolution.

mod archive;
mod export;
mod import;
mod manifest;

pub use export::{export, ExportOptions};
pub use import::{
    import, ConflictPolicy, ImportMode, ImportOptions, ImportReport, ProjectImportOutcome,
};
pub use manifest::{FileEntry, Manifest, ProjectEntry, MANIFEST_VERSION};

use archive::load_archive;

/// Validates a snapshot archive without importing it (spec §4.5
/// Validation): parses the manifest, checks required entries are present,
/// and verifies every `FileEntry`'s checksum against the archived bytes.
pub fn validate<R: std::io::Read>(reader: R) -> qm_core::Result<Manifest> {
    Ok(load_archive(reader)?.manifest)
}

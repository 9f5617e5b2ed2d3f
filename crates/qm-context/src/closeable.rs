// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Close as an optional capability (spec §9 "Closeable-as-capability").

use qm_core::Result;

/// Implemented by collaborator handles that own a resource worth flushing or
/// releasing on shutdown. Not every implementation needs one; the core
/// probes for it via `as_closeable` rather than requiring every collaborator
/// trait to carry a mandatory `close`.
pub trait Closeable: Send + Sync {
    fn close(&self) -> Result<()>;
}

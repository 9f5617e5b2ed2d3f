// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Call-site options for registry operations.

/// Optional overrides for `Registry::add_project`. Missing fields are
/// derived from the project path.
#[derive(Debug, Clone, Default)]
pub struct AddProjectOptions {
    pub name: Option<String>,
    pub color: Option<String>,
}

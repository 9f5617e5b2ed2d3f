// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qm_core::{FakeClock, SequentialProjectIdGen};
use std::fs;
use tempfile::TempDir;

fn make_quorum_dir(root: &Path) {
    fs::create_dir_all(root.join(".quorum")).unwrap();
}

fn open_registry(dir: &TempDir) -> Registry {
    Registry::open(
        dir.path().join("projects.yaml"),
        SequentialProjectIdGen::new(),
        FakeClock::new(),
        true,
    )
    .unwrap()
}

fn tok() -> CancellationToken {
    CancellationToken::new()
}

#[test]
fn add_project_requires_quorum_directory() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("proj");
    fs::create_dir_all(&project_root).unwrap();

    let err = registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap_err();
    assert_eq!(err.code(), "NOT_QUORUM_PROJECT");
}

#[test]
fn add_project_rejects_relative_or_dirty_path() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let err = registry
        .add_project(Path::new("relative/path"), AddProjectOptions::default(), &tok())
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_PATH");
}

#[test]
fn add_project_derives_name_color_and_becomes_default() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("my-cool_project");
    make_quorum_dir(&project_root);

    let project = registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap();
    assert_eq!(project.name, "My Cool Project");
    assert!(qm_core::COLOR_PALETTE.contains(&project.color.as_str()));
    assert_eq!(project.config_mode, ConfigMode::InheritGlobal);

    let default = registry.get_default_project(&tok()).unwrap();
    assert_eq!(default.id, project.id);
}

#[test]
fn add_project_honors_custom_config_mode_when_config_yaml_present() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("proj");
    make_quorum_dir(&project_root);
    fs::write(project_root.join(".quorum").join("config.yaml"), "x: 1").unwrap();

    let project = registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap();
    assert_eq!(project.config_mode, ConfigMode::Custom);
}

#[test]
fn add_project_rejects_duplicate_path() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("proj");
    make_quorum_dir(&project_root);

    registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap();
    let err = registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap_err();
    assert_eq!(err.code(), "PROJECT_ALREADY_EXISTS");
}

#[test]
fn remove_project_reassigns_default_to_first_remaining() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");
    make_quorum_dir(&root_a);
    make_quorum_dir(&root_b);

    let a = registry
        .add_project(&root_a, AddProjectOptions::default(), &tok())
        .unwrap();
    let b = registry
        .add_project(&root_b, AddProjectOptions::default(), &tok())
        .unwrap();
    assert_eq!(registry.get_default_project(&tok()).unwrap().id, a.id);

    registry.remove_project(&a.id, &tok()).unwrap();
    assert_eq!(registry.get_default_project(&tok()).unwrap().id, b.id);

    registry.remove_project(&b.id, &tok()).unwrap();
    let err = registry.get_default_project(&tok()).unwrap_err();
    assert_eq!(err.code(), "NO_DEFAULT_PROJECT");
}

#[test]
fn remove_project_missing_id_errors() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let err = registry
        .remove_project(&ProjectId::new("proj-does-not-exist"), &tok())
        .unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
}

#[test]
fn validate_project_transitions_through_statuses() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("proj");
    make_quorum_dir(&project_root);
    let project = registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap();

    // inherit_global, no config.yaml -> healthy
    let status = registry.validate_project(&project.id, &tok()).unwrap();
    assert_eq!(status, ProjectStatus::Healthy);

    // switch to custom mode with no config.yaml -> degraded
    let mut custom = registry.get_project(&project.id, &tok()).unwrap();
    custom.config_mode = ConfigMode::Custom;
    registry.update_project(custom, &tok()).unwrap();
    let status = registry.validate_project(&project.id, &tok()).unwrap();
    assert_eq!(status, ProjectStatus::Degraded);

    // config.yaml present -> healthy regardless of mode
    fs::write(project_root.join(".quorum").join("config.yaml"), "x: 1").unwrap();
    let status = registry.validate_project(&project.id, &tok()).unwrap();
    assert_eq!(status, ProjectStatus::Healthy);

    // .quorum removed -> offline, returns a validation error
    fs::remove_dir_all(project_root.join(".quorum")).unwrap();
    let err = registry.validate_project(&project.id, &tok()).unwrap_err();
    assert_eq!(err.code(), "PROJECT_OFFLINE");
    let reloaded = registry.get_project(&project.id, &tok()).unwrap();
    assert_eq!(reloaded.status, ProjectStatus::Offline);
}

#[test]
fn validate_all_continues_through_failures_and_returns_last_error() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");
    make_quorum_dir(&root_a);
    make_quorum_dir(&root_b);
    let a = registry
        .add_project(&root_a, AddProjectOptions::default(), &tok())
        .unwrap();
    registry
        .add_project(&root_b, AddProjectOptions::default(), &tok())
        .unwrap();

    fs::remove_dir_all(root_a.join(".quorum")).unwrap();
    let err = registry.validate_all(&tok()).unwrap_err();
    assert_eq!(err.code(), "PROJECT_OFFLINE");
    assert_eq!(
        registry.get_project(&a.id, &tok()).unwrap().status,
        ProjectStatus::Offline
    );
}

#[test]
fn merge_from_disk_preserves_concurrent_additions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.yaml");
    let registry_a = Registry::open(&path, SequentialProjectIdGen::new(), FakeClock::new(), true).unwrap();
    let registry_b = Registry::open(&path, SequentialProjectIdGen::new(), FakeClock::new(), true).unwrap();

    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");
    make_quorum_dir(&root_a);
    make_quorum_dir(&root_b);

    registry_a
        .add_project(&root_a, AddProjectOptions::default(), &tok())
        .unwrap();
    registry_b
        .add_project(&root_b, AddProjectOptions::default(), &tok())
        .unwrap();

    // registry_a's last write merged registry_b's on-disk record back in.
    registry_a.reload(&tok()).unwrap();
    let projects = registry_a.list_projects(&tok()).unwrap();
    assert_eq!(projects.len(), 2);
}

#[test]
fn removed_id_is_not_resurrected_by_merge_from_disk_until_save_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.yaml");
    let registry_a = Registry::open(&path, SequentialProjectIdGen::new(), FakeClock::new(), true).unwrap();
    let root_a = dir.path().join("a");
    make_quorum_dir(&root_a);
    let a = registry_a
        .add_project(&root_a, AddProjectOptions::default(), &tok())
        .unwrap();

    let registry_b = Registry::open(&path, SequentialProjectIdGen::new(), FakeClock::new(), true).unwrap();
    registry_a.remove_project(&a.id, &tok()).unwrap();

    // registry_b still has the stale in-memory record, but a fresh load
    // from disk (what registry_b's own next save would merge against)
    // no longer contains it.
    let on_disk = fs::read_to_string(&path).unwrap();
    assert!(!on_disk.contains(a.id.as_str()));
    let _ = registry_b;
}

#[test]
fn touch_project_updates_last_accessed() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("proj");
    make_quorum_dir(&project_root);
    let project = registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap();
    let before = project.last_accessed;

    registry.touch_project(&project.id, &tok()).unwrap();
    let after = registry.get_project(&project.id, &tok()).unwrap();
    assert!(after.last_accessed >= before);
}

#[test]
fn close_is_idempotent_and_flushes_once() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let project_root = dir.path().join("proj");
    make_quorum_dir(&project_root);
    registry
        .add_project(&project_root, AddProjectOptions::default(), &tok())
        .unwrap();

    registry.close(&tok()).unwrap();
    registry.close(&tok()).unwrap();

    let err = registry.touch_project(&ProjectId::new("proj-anything"), &tok());
    assert_eq!(err.unwrap_err().code(), "REGISTRY_CLOSED");
}

#[test]
fn cancelled_token_short_circuits_every_operation() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let token = CancellationToken::new();
    token.cancel();

    let err = registry.list_projects(&token).unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
}

#[test]
fn validate_project_path_rejects_missing_quorum_dir() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    let err = validate_project_path(&root).unwrap_err();
    assert_eq!(err.code(), "NOT_QUORUM_PROJECT");
}

#[test]
fn validate_project_path_accepts_well_formed_project() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("proj");
    make_quorum_dir(&root);
    validate_project_path(&root).unwrap();
}

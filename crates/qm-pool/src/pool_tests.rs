// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qm_core::{FakeClock, SequentialProjectIdGen};
use qm_registry::{AddProjectOptions, Registry};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn tok() -> CancellationToken {
    CancellationToken::new()
}

fn registry(dir: &TempDir, clock: FakeClock) -> Arc<Registry<FakeClock>> {
    Arc::new(
        Registry::open(
            dir.path().join("projects.yaml"),
            SequentialProjectIdGen::new(),
            clock,
            false,
        )
        .unwrap(),
    )
}

fn add_project(reg: &Registry<FakeClock>, dir: &TempDir, name: &str) -> ProjectId {
    let root = dir.path().join(name);
    fs::create_dir_all(root.join(".quorum")).unwrap();
    reg.add_project(&root, AddProjectOptions::default(), &tok())
        .unwrap()
        .id
}

fn small_pool(
    reg: Arc<Registry<FakeClock>>,
    clock: FakeClock,
    max_active: usize,
    min_active: usize,
) -> StatePool<FakeClock> {
    StatePool::new(
        reg,
        clock,
        PoolConfig {
            max_active,
            min_active,
            grace_period: Duration::minutes(5),
            event_buffer_size: 16,
        },
    )
}

#[tokio::test]
async fn get_context_creates_then_hits_on_second_call() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let id = add_project(&reg, &dir, "p1");
    let pool = small_pool(reg, clock, 5, 2);

    let ctx1 = pool.get_context(&id, &tok()).await.unwrap();
    let ctx2 = pool.get_context(&id, &tok()).await.unwrap();
    assert!(Arc::ptr_eq(&ctx1, &ctx2));

    let metrics = pool.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.active, 1);
    assert!((metrics.hit_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn get_context_unknown_project_increments_errors() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let pool = small_pool(reg, clock, 5, 2);

    let err = pool
        .get_context(&ProjectId::new("proj-000000000000"), &tok())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
    assert_eq!(pool.metrics().errors, 1);
}

#[tokio::test]
async fn evict_lru_removes_oldest_past_grace_period() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let p2 = add_project(&reg, &dir, "p2");
    let p3 = add_project(&reg, &dir, "p3");
    let pool = small_pool(reg, clock.clone(), 2, 1);

    pool.get_context(&p1, &tok()).await.unwrap();
    pool.get_context(&p2, &tok()).await.unwrap();
    assert_eq!(pool.size(), 2);

    clock.advance(std::time::Duration::from_secs(10 * 60));
    pool.get_context(&p3, &tok()).await.unwrap();

    assert_eq!(pool.size(), 2);
    assert!(!pool.is_loaded(&p1), "oldest entry should have been evicted");
    assert!(pool.is_loaded(&p2));
    assert!(pool.is_loaded(&p3));
    assert_eq!(pool.metrics().evictions, 1);
}

#[tokio::test]
async fn evict_lru_skips_entries_within_grace_period() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let p2 = add_project(&reg, &dir, "p2");
    let pool = small_pool(reg, clock, 1, 0);

    pool.get_context(&p1, &tok()).await.unwrap();
    // No time has passed: p1 is still within the grace period, so eviction
    // has no eligible candidate and GetContext must proceed anyway.
    pool.get_context(&p2, &tok()).await.unwrap();

    assert_eq!(pool.size(), 2, "no eviction candidate means capacity is exceeded temporarily");
    assert_eq!(pool.metrics().evictions, 0);
}

#[tokio::test]
async fn eviction_skips_contexts_with_running_workflows() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let p2 = add_project(&reg, &dir, "p2");

    // Pre-seed p1's state file with a running workflow id before the pool
    // ever constructs its context, so the freshly opened FileStateManager
    // reads it back.
    let state_dir = dir.path().join("p1").join(".quorum").join("state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join("state.db"), br#"["wf-1"]"#).unwrap();

    let pool = small_pool(reg, clock.clone(), 1, 0);
    pool.get_context(&p1, &tok()).await.unwrap();
    clock.advance(std::time::Duration::from_secs(10 * 60));
    pool.get_context(&p2, &tok()).await.unwrap();

    assert!(pool.is_loaded(&p1), "context with running workflows must not be evicted");
    assert!(pool.is_loaded(&p2));
    assert_eq!(pool.metrics().evictions, 0);
}

#[tokio::test]
async fn evict_project_bypasses_grace_and_running_workflow_checks() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let pool = small_pool(reg, clock, 5, 0);

    pool.get_context(&p1, &tok()).await.unwrap();
    pool.evict_project(&p1).await.unwrap();

    assert!(!pool.is_loaded(&p1));
    assert_eq!(pool.metrics().evictions, 1);

    let err = pool.evict_project(&p1).await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
}

#[tokio::test]
async fn cleanup_evicts_contexts_for_removed_projects() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let pool = small_pool(reg.clone(), clock, 5, 0);

    pool.get_context(&p1, &tok()).await.unwrap();
    reg.remove_project(&p1, &tok()).unwrap();
    pool.cleanup(&tok()).await.unwrap();

    assert!(!pool.is_loaded(&p1));
}

#[tokio::test]
async fn context_info_tracks_access_count() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let pool = small_pool(reg, clock, 5, 2);

    pool.get_context(&p1, &tok()).await.unwrap();
    pool.get_context(&p1, &tok()).await.unwrap();
    pool.get_context(&p1, &tok()).await.unwrap();

    let info = pool.context_info(&p1).unwrap();
    assert_eq!(info.access_count, 3);
}

#[tokio::test]
async fn close_is_idempotent_and_rejects_further_access() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let pool = small_pool(reg, clock, 5, 2);

    pool.get_context(&p1, &tok()).await.unwrap();
    pool.close().await.unwrap();
    pool.close().await.unwrap();

    let err = pool.get_context(&p1, &tok()).await.unwrap_err();
    assert_eq!(err.code(), "POOL_CLOSED");
}

#[tokio::test]
async fn preload_loads_best_effort_and_ignores_unknown_ids() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let reg = registry(&dir, clock.clone());
    let p1 = add_project(&reg, &dir, "p1");
    let pool = small_pool(reg, clock, 5, 2);

    let unknown = ProjectId::new("proj-ffffffffffff");
    pool.preload(&[p1.clone(), unknown.clone()], &tok()).await;

    assert!(pool.is_loaded(&p1));
    assert!(!pool.is_loaded(&unknown));
}

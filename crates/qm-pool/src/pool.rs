// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `StatePool` (spec §4.2): an LRU cache of live `ProjectContext`s, bounded
//! by `max_active`, never evicted below `min_active`, with a grace period
//! that protects recently accessed contexts from eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use qm_context::{ProjectContext, ProjectContextOptions};
use qm_core::{Clock, Error, ProjectId, Result};
use qm_registry::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Defaults from spec §4.2: "max=5, min=2, grace=5m, event-buffer=100."
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_active: usize,
    pub min_active: usize,
    pub grace_period: Duration,
    pub event_buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: 5,
            min_active: 2,
            grace_period: Duration::minutes(5),
            event_buffer_size: 100,
        }
    }
}

/// Point-in-time metrics snapshot (spec §4.2 `GetMetrics`).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMetrics {
    pub active: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Introspection record for one loaded context (spec §4.2 `GetContextInfo`).
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub id: ProjectId,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
    pub access_count: u64,
}

/// Per-context pool metadata (spec §3 `PoolEntry`): the context itself, an
/// access counter, and the monotonic instant of last access used for grace
/// period math. This is tracked separately from `ProjectContext`'s own
/// wall-clock `last_accessed` (exposed for introspection via
/// `ContextInfo`): eviction grace periods are elapsed-time comparisons, and
/// `Clock::now()` is the monotonic instant meant for exactly that (spec §4.2
/// "grace period... protects recently accessed contexts").
struct PoolEntry {
    context: Arc<ProjectContext>,
    access_count: AtomicU64,
    last_accessed: Mutex<Instant>,
}

struct PoolState {
    entries: HashMap<ProjectId, PoolEntry>,
    /// Oldest-to-newest access order; the tail is the most recently used id.
    order: Vec<ProjectId>,
    closed: bool,
}

/// LRU cache of live `ProjectContext`s (spec §4.2). Generic over the clock,
/// matching `Registry<C: Clock>`, so tests can drive grace-period logic with
/// a `FakeClock`.
pub struct StatePool<C: Clock> {
    inner: RwLock<PoolState>,
    registry: Arc<Registry<C>>,
    clock: C,
    config: PoolConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl<C: Clock> StatePool<C> {
    pub fn new(registry: Arc<Registry<C>>, clock: C, config: PoolConfig) -> Self {
        Self {
            inner: RwLock::new(PoolState {
                entries: HashMap::new(),
                order: Vec::new(),
                closed: false,
            }),
            registry,
            clock,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// `GetContext(id)` (spec §4.2): fast read-claimed hit path, falling
    /// back to an exclusive slow path that looks the project up in the
    /// registry, evicts if at capacity, and constructs a fresh context.
    pub async fn get_context(
        &self,
        id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProjectContext>> {
        check_cancel(cancel)?;
        self.ensure_open()?;

        if let Some(ctx) = self.fast_path_hit(id) {
            return Ok(ctx);
        }

        check_cancel(cancel)?;
        // Re-check before paying for a registry lookup and context
        // construction: another caller may have won the race already.
        if let Some(ctx) = self.fast_path_hit(id) {
            return Ok(ctx);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let project = match self.registry.get_project(id, cancel) {
            Ok(p) => p,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        if let Err(e) = self.registry.validate_project(id, cancel) {
            warn!(project = %id, error = %e, "project degraded at context creation");
        }

        if self.size() >= self.config.max_active {
            if let Err(e) = self.evict_lru(cancel).await {
                debug!(project = %id, error = %e, "no eviction candidate, exceeding max_active temporarily");
            }
        }

        let now = self.clock.utc_now();
        let ctx = match ProjectContext::open(
            id.clone(),
            project.path.clone(),
            ProjectContextOptions {
                event_buffer_size: Some(self.config.event_buffer_size),
                config_mode: project.config_mode,
            },
            now,
        )
        .await
        {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let winner = {
            let mut inner = self.inner.write();
            if inner.closed {
                drop(inner);
                let _ = ctx.close().await;
                return Err(Error::PoolClosed);
            }
            if let Some(existing) = inner.entries.get(id) {
                existing.context.clone()
            } else {
                inner.entries.insert(
                    id.clone(),
                    PoolEntry {
                        context: ctx.clone(),
                        access_count: AtomicU64::new(1),
                        last_accessed: Mutex::new(self.clock.now()),
                    },
                );
                inner.order.push(id.clone());
                ctx.clone()
            }
        };

        if !Arc::ptr_eq(&winner, &ctx) {
            // Lost the race: someone else's context is already installed.
            let _ = ctx.close().await;
        } else {
            let _ = self.registry.touch_project(id, cancel);
        }
        Ok(winner)
    }

    fn fast_path_hit(&self, id: &ProjectId) -> Option<Arc<ProjectContext>> {
        let inner = self.inner.upgradable_read();
        if inner.closed || !inner.entries.contains_key(id) {
            return None;
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        let PoolState { entries, order, .. } = &mut *inner;
        let entry = entries.get(id)?;
        entry.access_count.fetch_add(1, Ordering::Relaxed);
        *entry.last_accessed.lock() = self.clock.now();
        let ctx = entry.context.clone();
        move_to_tail(order, id);
        drop(inner);
        ctx.touch(self.clock.utc_now());
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(ctx)
    }

    /// `EvictLRU` (spec §4.2): oldest-to-newest scan, skipping contexts
    /// within the grace period or reporting running workflows. Splices out
    /// stale order entries (map already missing the id) along the way.
    pub async fn evict_lru(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        self.prune_stale_order_entries();

        let snapshot: Vec<(ProjectId, Arc<ProjectContext>, Instant)> = {
            let inner = self.inner.read();
            if inner.entries.len() <= self.config.min_active {
                return Ok(());
            }
            inner
                .order
                .iter()
                .filter_map(|id| {
                    inner
                        .entries
                        .get(id)
                        .map(|e| (id.clone(), e.context.clone(), *e.last_accessed.lock()))
                })
                .collect()
        };

        let now = self.clock.now();
        let grace_period = self.config.grace_period.to_std().unwrap_or_default();
        for (id, ctx, last_accessed) in snapshot {
            check_cancel(cancel)?;
            if now.duration_since(last_accessed) < grace_period {
                continue;
            }
            match ctx.has_running_workflows().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(project = %id, error = %e, "could not check running workflows, skipping eviction candidate");
                    continue;
                }
            }

            let removed = {
                let mut inner = self.inner.write();
                if inner.entries.len() <= self.config.min_active {
                    return Ok(());
                }
                let removed = inner.entries.remove(&id);
                inner.order.retain(|x| x != &id);
                removed
            };
            if let Some(entry) = removed {
                let _ = entry.context.close().await;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            // Someone else already evicted this id; keep scanning.
        }
        Err(Error::NotFound("no eviction candidate within grace period".into()))
    }

    /// `EvictProject(id)` (spec §4.2): manual bypass, ignoring grace period
    /// and running-workflow checks.
    pub async fn evict_project(&self, id: &ProjectId) -> Result<()> {
        let entry = {
            let mut inner = self.inner.write();
            let entry = inner
                .entries
                .remove(id)
                .ok_or_else(|| Error::ProjectNotFound(id.to_string()))?;
            inner.order.retain(|x| x != id);
            entry
        };
        entry.context.close().await?;
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn prune_stale_order_entries(&self) {
        let mut inner = self.inner.write();
        let PoolState { entries, order, .. } = &mut *inner;
        order.retain(|id| entries.contains_key(id));
    }

    /// `GetMetrics` (spec §4.2): wait-free, reads the atomic counters only.
    pub fn metrics(&self) -> PoolMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        PoolMetrics {
            active: self.size(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    pub fn active_projects(&self) -> Vec<ProjectId> {
        self.inner.read().entries.keys().cloned().collect()
    }

    pub fn is_loaded(&self, id: &ProjectId) -> bool {
        self.inner.read().entries.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn context_info(&self, id: &ProjectId) -> Option<ContextInfo> {
        let inner = self.inner.read();
        inner.entries.get(id).map(|e| ContextInfo {
            id: id.clone(),
            created_at: e.context.created_at(),
            last_accessed: e.context.last_accessed(),
            access_count: e.access_count.load(Ordering::Relaxed),
        })
    }

    /// `ValidateAll` (spec §4.2): snapshots the id list, validates each
    /// context and its registry record, logging failures without stopping.
    pub async fn validate_all(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let snapshot: Vec<(ProjectId, Arc<ProjectContext>)> = {
            let inner = self.inner.read();
            inner
                .entries
                .iter()
                .map(|(id, e)| (id.clone(), e.context.clone()))
                .collect()
        };

        let mut last_err = None;
        for (id, ctx) in snapshot {
            if let Err(e) = ctx.validate().await {
                warn!(project = %id, error = %e, "context validation failed");
                last_err = Some(e);
            }
            if let Err(e) = self.registry.validate_project(&id, cancel) {
                warn!(project = %id, error = %e, "registry validation failed");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `Cleanup` (spec §4.2): evicts contexts whose project no longer
    /// exists in the registry.
    pub async fn cleanup(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let ids: Vec<ProjectId> = self.inner.read().entries.keys().cloned().collect();
        for id in ids {
            if self.registry.get_project(&id, cancel).is_err() {
                if let Err(e) = self.evict_project(&id).await {
                    warn!(project = %id, error = %e, "cleanup eviction failed");
                }
            }
        }
        Ok(())
    }

    /// `Preload(ids)` (spec §4.2): best-effort, logs rather than returns
    /// individual failures.
    pub async fn preload(&self, ids: &[ProjectId], cancel: &CancellationToken) {
        for id in ids {
            if let Err(e) = self.get_context(id, cancel).await {
                warn!(project = %id, error = %e, "preload failed");
            }
        }
    }

    /// `Close` (spec §4.2): closes every owned context, marks the pool
    /// closed. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let entries = {
            let mut inner = self.inner.write();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            inner.order.clear();
            std::mem::take(&mut inner.entries)
        };

        let mut errors = Vec::new();
        for (id, entry) in entries {
            if let Err(e) = entry.context.close().await {
                warn!(project = %id, error = %e, "error closing context during pool shutdown");
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Conflict(errors.join("; ")))
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.read().closed {
            Err(Error::PoolClosed)
        } else {
            Ok(())
        }
    }
}

fn move_to_tail(order: &mut Vec<ProjectId>, id: &ProjectId) {
    if let Some(pos) = order.iter().position(|x| x == id) {
        let id = order.remove(pos);
        order.push(id);
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

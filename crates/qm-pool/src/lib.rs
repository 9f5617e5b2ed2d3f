// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qm-pool: the LRU cache of live `ProjectContext`s (spec §4.2) — capacity
//! bounds, eviction grace periods, "never evict while workflows run," and
//! pool-wide metrics/introspection/cleanup operations.

mod pool;

pub use pool::{ContextInfo, PoolConfig, PoolMetrics, StatePool};

/// The pool type production callers construct: real wall clock.
pub type ProdPool = StatePool<qm_core::SystemClock>;

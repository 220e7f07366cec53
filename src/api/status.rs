//! Read model for `/api/status`. Built from atomics and one cache read lock;
//! never triggers work.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::cycle_stats::CycleStats;
use crate::state::{ProgressState, ProgressView, SnapshotCache, SourceKind};
use crate::types::Phase;

/// Coordinator-owned counters that are not part of progress state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshCounters {
    pub combines: u64,
    pub auto_refreshes: u64,
    pub auto_refresh_armed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub phase: Phase,
    pub in_flight: bool,
    pub progress: ProgressView,
    /// Records in the current snapshot (0 before the first cycle).
    pub total_count: usize,
    /// Size of the retained rewards slug set.
    pub rewards_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub listing_failures: u64,
    pub rewards_failures: u64,
    pub combines: u64,
    /// Cycles started by the timer rather than a trigger.
    pub auto_refreshes: u64,
    pub auto_refresh_armed: bool,
    pub last_cycle_ms: Option<u64>,
    pub cycle_p50_ms: Option<u64>,
    pub cycle_p95_ms: Option<u64>,
}

pub fn snapshot_status(
    progress: &ProgressState,
    cache: &SnapshotCache,
    rewards_count: usize,
    counters: RefreshCounters,
    cycles: &CycleStats,
) -> StatusReport {
    let current = cache.current();
    let (cycle_p50_ms, cycle_p95_ms) = cycles.percentiles();

    StatusReport {
        phase: progress.phase(),
        in_flight: progress.in_flight(),
        progress: progress.view(),
        total_count: current.as_ref().map_or(0, |s| s.len()),
        rewards_count,
        last_updated: current.as_ref().map(|s| s.updated_at()),
        cycles_completed: progress.cycles_completed(),
        listing_failures: progress.failures(SourceKind::Listing),
        rewards_failures: progress.failures(SourceKind::Rewards),
        combines: counters.combines,
        auto_refreshes: counters.auto_refreshes,
        auto_refresh_armed: counters.auto_refresh_armed,
        last_cycle_ms: cycles.last_ms(),
        cycle_p50_ms,
        cycle_p95_ms,
    }
}

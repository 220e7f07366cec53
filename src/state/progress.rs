//! Shared refresh progress. Adapters bump their own counter; the coordinator
//! owns phase, in-flight flag, totals and failure counts. Readers never block.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::types::Phase;

/// Incremental item counter handed to one adapter for the duration of a call.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicUsize>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, n: usize) {
        self.0.store(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Which adapter a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Listing,
    Rewards,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Listing => write!(f, "listing"),
            SourceKind::Rewards => write!(f, "rewards"),
        }
    }
}

/// Point-in-time copy of the counters, shaped like the `progress` object
/// polling clients already understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub markets: usize,
    pub rewards: usize,
    pub status: Phase,
}

pub struct ProgressState {
    listing: ProgressCounter,
    rewards: ProgressCounter,
    phase: AtomicU8,
    /// True while exactly one cycle runs. Flipped false→true only via `try_begin`.
    in_flight: AtomicBool,
    cycles_completed: AtomicU64,
    listing_failures: AtomicU64,
    rewards_failures: AtomicU64,
}

impl ProgressState {
    pub fn new() -> Self {
        Self {
            listing: ProgressCounter::new(),
            rewards: ProgressCounter::new(),
            phase: AtomicU8::new(Phase::Idle.as_u8()),
            in_flight: AtomicBool::new(false),
            cycles_completed: AtomicU64::new(0),
            listing_failures: AtomicU64::new(0),
            rewards_failures: AtomicU64::new(0),
        }
    }

    /// Claim the in-flight flag. Returns false if another cycle already holds it.
    pub fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reset counters to `{0, 0, fetching}`. Only valid after a successful `try_begin`.
    pub fn reset_for_cycle(&self) {
        self.listing.set(0);
        self.rewards.set(0);
        self.phase.store(Phase::Fetching.as_u8(), Ordering::Release);
    }

    /// Publish final counts, mark ready and release the in-flight flag.
    /// Must be called after the cache swap.
    pub fn finish(&self, records: usize, keys: usize) {
        self.listing.set(records);
        self.rewards.set(keys);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.phase.store(Phase::Ready.as_u8(), Ordering::Release);
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn record_failure(&self, source: SourceKind) {
        let counter = match source {
            SourceKind::Listing => &self.listing_failures,
            SourceKind::Rewards => &self.rewards_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listing_counter(&self) -> ProgressCounter {
        self.listing.clone()
    }

    pub fn rewards_counter(&self) -> ProgressCounter {
        self.rewards.clone()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn view(&self) -> ProgressView {
        ProgressView {
            markets: self.listing.get(),
            rewards: self.rewards.get(),
            status: self.phase(),
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn failures(&self, source: SourceKind) -> u64 {
        match source {
            SourceKind::Listing => self.listing_failures.load(Ordering::Relaxed),
            SourceKind::Rewards => self.rewards_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_begin_wins_until_finish() {
        let state = ProgressState::new();
        assert!(state.try_begin());
        assert!(!state.try_begin());
        state.finish(3, 1);
        assert!(!state.in_flight());
        assert!(state.try_begin());
    }

    #[test]
    fn reset_zeroes_counters_and_enters_fetching() {
        let state = ProgressState::new();
        state.listing_counter().set(42);
        state.rewards_counter().set(7);
        assert!(state.try_begin());
        state.reset_for_cycle();
        assert_eq!(
            state.view(),
            ProgressView { markets: 0, rewards: 0, status: Phase::Fetching }
        );
    }

    #[test]
    fn finish_publishes_final_counts() {
        let state = ProgressState::new();
        assert!(state.try_begin());
        state.reset_for_cycle();
        state.finish(120, 45);
        assert_eq!(
            state.view(),
            ProgressView { markets: 120, rewards: 45, status: Phase::Ready }
        );
        assert_eq!(state.cycles_completed(), 1);
    }

    #[test]
    fn failures_are_counted_per_source() {
        let state = ProgressState::new();
        state.record_failure(SourceKind::Rewards);
        state.record_failure(SourceKind::Rewards);
        state.record_failure(SourceKind::Listing);
        assert_eq!(state.failures(SourceKind::Rewards), 2);
        assert_eq!(state.failures(SourceKind::Listing), 1);
    }

    #[test]
    fn counter_clones_share_storage() {
        let state = ProgressState::new();
        let handle = state.listing_counter();
        handle.set(17);
        assert_eq!(state.view().markets, 17);
    }
}

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::api::cycle_stats::CycleStats;
use crate::api::status::{snapshot_status, RefreshCounters, StatusReport};
use crate::combiner::combine;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::refresh::timer::AutoRefreshTimer;
use crate::sources::{
    DisabledKeySource, GammaListingFetcher, KeySet, KeySource, ListingSource, RewardsScraper,
    SourceOutcome,
};
use crate::state::{CacheRead, ProgressState, SnapshotCache, SourceKind};

/// Answer to a refresh trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshTrigger {
    Started,
    /// A cycle was already in flight; the trigger was dropped.
    Busy,
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// Delay between a completed cycle and the next automatic one.
    pub interval: Duration,
    /// Wall-clock bound on each adapter per cycle.
    pub adapter_timeout: Duration,
}

impl From<&Config> for RefreshSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            interval: cfg.refresh_interval,
            adapter_timeout: cfg.adapter_timeout,
        }
    }
}

struct Inner {
    listing: Arc<dyn ListingSource>,
    rewards: Arc<dyn KeySource>,
    settings: RefreshSettings,
    cache: SnapshotCache,
    progress: ProgressState,
    /// Last non-empty rewards result. An empty scrape never overwrites it.
    known_keys: Mutex<Arc<KeySet>>,
    /// Mirrors `known_keys.len()` so status reads stay lock-free.
    known_keys_len: AtomicUsize,
    timer: Arc<AutoRefreshTimer>,
    cycle_stats: CycleStats,
    combines: AtomicU64,
}

/// Runs both source adapters, joins them, combines and publishes a snapshot.
///
/// Cheap to clone; every clone drives the same state. Built once by the entry
/// point and handed to the HTTP layer.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        listing: Arc<dyn ListingSource>,
        rewards: Arc<dyn KeySource>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                listing,
                rewards,
                settings,
                cache: SnapshotCache::new(),
                progress: ProgressState::new(),
                known_keys: Mutex::new(Arc::new(KeySet::new())),
                known_keys_len: AtomicUsize::new(0),
                timer: AutoRefreshTimer::new(),
                cycle_stats: CycleStats::new(),
                combines: AtomicU64::new(0),
            }),
        }
    }

    /// Wire up the Gamma fetcher and the rewards scraper (or the disabled
    /// stand-in) from configuration.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let listing: Arc<dyn ListingSource> = Arc::new(GammaListingFetcher::new(cfg)?);
        let rewards: Arc<dyn KeySource> = if cfg.rewards_enabled {
            Arc::new(RewardsScraper::new(cfg)?)
        } else {
            Arc::new(DisabledKeySource)
        };
        Ok(Self::new(listing, rewards, RefreshSettings::from(cfg)))
    }

    /// Start a refresh cycle unless one is already running. Never blocks on
    /// the cycle itself.
    pub fn start_refresh(&self) -> RefreshTrigger {
        if !self.inner.progress.try_begin() {
            debug!("Refresh already in progress");
            return RefreshTrigger::Busy;
        }

        self.inner.cache.retain_current_as_previous();
        self.inner.progress.reset_for_cycle();
        // A manual trigger supersedes whatever the timer had scheduled.
        self.inner.timer.cancel();

        let this = self.clone();
        tokio::spawn(async move { this.run_cycle().await });

        info!(
            listing = self.inner.listing.name(),
            rewards = self.inner.rewards.name(),
            "Refresh cycle started"
        );
        RefreshTrigger::Started
    }

    /// Disarm the pending auto-refresh, if any.
    pub fn cancel_auto_refresh(&self) {
        if self.inner.timer.cancel() {
            info!("Auto-refresh cancelled");
        }
    }

    /// Schedule the next automatic cycle, replacing any pending one.
    pub fn arm_auto_refresh(&self) {
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.settings.interval;
        self.inner.timer.arm(interval, move || {
            if let Some(inner) = weak.upgrade() {
                info!("Auto-refresh triggered");
                RefreshCoordinator { inner }.start_refresh();
            }
        });
        debug!("Auto-refresh scheduled in {}s", interval.as_secs());
    }

    async fn run_cycle(&self) {
        let started = Instant::now();
        let limit = self.inner.settings.adapter_timeout;

        let listing = Arc::clone(&self.inner.listing);
        let listing_progress = self.inner.progress.listing_counter();
        let listing_task = tokio::spawn(async move {
            match tokio::time::timeout(limit, listing.fetch_records(&listing_progress)).await {
                Ok(outcome) => outcome,
                Err(_) => SourceOutcome::failed(AppError::Timeout(limit)),
            }
        });

        let rewards = Arc::clone(&self.inner.rewards);
        let rewards_progress = self.inner.progress.rewards_counter();
        let rewards_task = tokio::spawn(async move {
            match tokio::time::timeout(limit, rewards.fetch_keys(&rewards_progress)).await {
                Ok(outcome) => outcome,
                Err(_) => SourceOutcome::failed(AppError::Timeout(limit)),
            }
        });

        let (listing_res, rewards_res) = tokio::join!(listing_task, rewards_task);
        let (records, listing_failed) = self.settle(SourceKind::Listing, listing_res);
        let (fresh_keys, rewards_failed) = self.settle(SourceKind::Rewards, rewards_res);
        let keys = self.resolve_keys(fresh_keys, rewards_failed);

        // Listing outage: keep serving the last good snapshot and its timestamp.
        let outage = listing_failed && records.is_empty();
        if let Some(kept) = self.inner.cache.current().filter(|s| outage && !s.is_empty()) {
            warn!(
                records = kept.len(),
                updated_at = %kept.updated_at(),
                "Listing returned nothing; keeping the previous snapshot"
            );
            self.arm_auto_refresh();
            self.inner.progress.finish(kept.len(), keys.len());
            self.inner.cycle_stats.record(started.elapsed());
            return;
        }

        let (snapshot, summary) = combine(&records, &keys, Utc::now());
        self.inner.combines.fetch_add(1, Ordering::Relaxed);
        let published = self.inner.cache.publish(snapshot);
        debug!(
            flagged = published.rewards_count(),
            updated_at = %published.updated_at(),
            "Snapshot published"
        );

        // Re-arm before releasing the in-flight flag so a trigger arriving
        // right after `finish` cancels this arm instead of racing it.
        self.arm_auto_refresh();
        self.inner.progress.finish(summary.kept, keys.len());

        let elapsed = started.elapsed();
        self.inner.cycle_stats.record(elapsed);
        info!(
            records = summary.kept,
            dropped = summary.dropped_placeholders,
            rewards = summary.rewards,
            known_slugs = keys.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Combined: {} markets, {} with rewards",
            summary.kept,
            summary.rewards,
        );
    }

    /// Unwrap an adapter task, turning a panic, timeout or upstream error into
    /// whatever partial data survived plus a failure count. The flag is true
    /// when the adapter failed.
    fn settle<T: Default>(
        &self,
        kind: SourceKind,
        joined: std::result::Result<SourceOutcome<T>, JoinError>,
    ) -> (T, bool) {
        let outcome = joined.unwrap_or_else(|e| SourceOutcome::failed(AppError::Join(e)));
        let failed = outcome.failure.is_some();
        if let Some(reason) = &outcome.failure {
            self.inner.progress.record_failure(kind);
            warn!(source = %kind, "Adapter failed, continuing with partial data: {reason}");
        }
        (outcome.items, failed)
    }

    /// Last-known-good retention: an empty rewards result keeps the previous
    /// non-empty set, and so does a failed walk that found fewer slugs than
    /// are already known. Anything else replaces it.
    fn resolve_keys(&self, fresh: KeySet, failed: bool) -> Arc<KeySet> {
        let mut known = self.known_keys();
        if fresh.is_empty() {
            if !known.is_empty() {
                warn!(
                    "Rewards source returned no slugs; keeping {} previously known",
                    known.len()
                );
            }
            return Arc::clone(&known);
        }
        if failed && fresh.len() < known.len() {
            warn!(
                partial = fresh.len(),
                known = known.len(),
                "Rewards walk failed part way; keeping the larger known set"
            );
            return Arc::clone(&known);
        }
        self.inner.known_keys_len.store(fresh.len(), Ordering::Relaxed);
        *known = Arc::new(fresh);
        Arc::clone(&known)
    }

    fn known_keys(&self) -> MutexGuard<'_, Arc<KeySet>> {
        match self.inner.known_keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Stale-while-revalidate read of the serving cache.
    pub fn read(&self) -> CacheRead {
        self.inner.cache.read(self.inner.progress.in_flight())
    }

    pub fn snapshot_status(&self) -> StatusReport {
        snapshot_status(
            &self.inner.progress,
            &self.inner.cache,
            self.rewards_count(),
            RefreshCounters {
                combines: self.combine_count(),
                auto_refreshes: self.timer_firings(),
                auto_refresh_armed: self.auto_refresh_armed(),
            },
            &self.inner.cycle_stats,
        )
    }

    pub fn progress(&self) -> &ProgressState {
        &self.inner.progress
    }

    /// Size of the retained rewards slug set.
    pub fn rewards_count(&self) -> usize {
        self.inner.known_keys_len.load(Ordering::Relaxed)
    }

    /// How many times the combiner has run.
    pub fn combine_count(&self) -> u64 {
        self.inner.combines.load(Ordering::Relaxed)
    }

    pub fn timer_firings(&self) -> u64 {
        self.inner.timer.firings()
    }

    pub fn auto_refresh_armed(&self) -> bool {
        self.inner.timer.is_armed()
    }
}

use std::sync::{Arc, RwLock};

use crate::types::Snapshot;

/// What a reader gets back from the cache.
#[derive(Debug, Clone)]
pub enum CacheRead {
    Served(Arc<Snapshot>),
    /// No cycle has ever completed.
    Loading,
}

impl CacheRead {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            CacheRead::Served(s) => Some(s),
            CacheRead::Loading => None,
        }
    }
}

#[derive(Debug, Default)]
struct CachePair {
    current: Option<Arc<Snapshot>>,
    previous: Option<Arc<Snapshot>>,
}

/// Current/previous snapshot pair with stale-while-revalidate reads.
///
/// Snapshots are built off to the side and installed with a pointer swap, so
/// the lock is only ever held long enough to clone or move an `Arc`.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    pair: RwLock<CachePair>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the snapshot a client should see.
    ///
    /// While a cycle is in flight the previous non-empty snapshot wins, so a
    /// reader never observes fewer records than the last complete generation.
    pub fn read(&self, in_flight: bool) -> CacheRead {
        let pair = match self.pair.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if in_flight {
            if let Some(prev) = pair.previous.as_ref().filter(|s| !s.is_empty()) {
                return CacheRead::Served(Arc::clone(prev));
            }
        }
        match pair.current.as_ref().or(pair.previous.as_ref()) {
            Some(s) => CacheRead::Served(Arc::clone(s)),
            None => CacheRead::Loading,
        }
    }

    /// Hold the current snapshot as `previous` for hot-serving during a new cycle.
    /// An empty current never displaces a non-empty previous.
    pub fn retain_current_as_previous(&self) {
        let mut pair = match self.pair.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = pair.current.clone().filter(|s| !s.is_empty()) {
            pair.previous = Some(current);
        }
    }

    /// Install a freshly combined snapshot. The old current becomes `previous`.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let fresh = Arc::new(snapshot);
        let mut pair = match self.pair.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = pair.current.replace(Arc::clone(&fresh)) {
            pair.previous = Some(old);
        }
        fresh
    }

    /// Latest published snapshot regardless of refresh state.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        match self.pair.read() {
            Ok(guard) => guard.current.clone(),
            Err(poisoned) => poisoned.into_inner().current.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::test_support::record;

    fn snapshot(n: usize) -> Snapshot {
        let records = (0..n)
            .map(|i| record(&i.to_string(), &format!("m{i}"), Some(50.0), Some(50.0)))
            .collect();
        Snapshot::new(records, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, n as u32).unwrap())
    }

    #[test]
    fn empty_cache_is_loading() {
        let cache = SnapshotCache::new();
        assert!(matches!(cache.read(false), CacheRead::Loading));
        assert!(matches!(cache.read(true), CacheRead::Loading));
    }

    #[test]
    fn idle_read_returns_current() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot(2));
        cache.publish(snapshot(5));
        let read = cache.read(false);
        assert_eq!(read.snapshot().unwrap().len(), 5);
    }

    #[test]
    fn in_flight_read_serves_previous() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot(4));
        cache.retain_current_as_previous();

        let during = cache.read(true);
        assert_eq!(during.snapshot().unwrap().len(), 4);
    }

    #[test]
    fn in_flight_read_never_shrinks_below_previous() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot(10));
        cache.retain_current_as_previous();
        // A smaller generation lands while readers still see the flag set.
        cache.publish(snapshot(3));

        let during = cache.read(true);
        assert!(during.snapshot().unwrap().len() >= 10);
        assert_eq!(cache.read(false).snapshot().unwrap().len(), 3);
    }

    #[test]
    fn first_cycle_in_flight_is_still_loading() {
        let cache = SnapshotCache::new();
        cache.retain_current_as_previous();
        assert!(matches!(cache.read(true), CacheRead::Loading));
    }

    #[test]
    fn empty_previous_falls_back_to_current() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot(0));
        cache.retain_current_as_previous();
        let read = cache.read(true);
        assert!(read.snapshot().unwrap().is_empty());
    }

    #[test]
    fn empty_current_does_not_displace_previous() {
        let cache = SnapshotCache::new();
        cache.publish(snapshot(6));
        cache.publish(snapshot(0));
        cache.retain_current_as_previous();

        assert_eq!(cache.read(true).snapshot().unwrap().len(), 6);
        assert!(cache.read(false).snapshot().unwrap().is_empty());
    }

    #[test]
    fn publish_keeps_old_current_as_previous() {
        let cache = SnapshotCache::new();
        let first = cache.publish(snapshot(1));
        cache.publish(snapshot(2));
        let during = cache.read(true);
        assert!(Arc::ptr_eq(during.snapshot().unwrap(), &first));
    }
}

//! Refresh-cycle wall-clock histogram. The coordinator records, status reads.
//! Percentiles are recomputed on record so readers only touch atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Values stored in milliseconds.
pub struct CycleStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
    /// Duration of the most recent cycle (0 = none yet).
    last_ms: AtomicU64,
    p50_ms: AtomicU64,
    p95_ms: AtomicU64,
}

impl CycleStats {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
            last_ms: AtomicU64::new(0),
            p50_ms: AtomicU64::new(0),
            p95_ms: AtomicU64::new(0),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 3_600_000) as u64;
        self.last_ms.store(ms, Ordering::Relaxed);
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
            self.p50_ms.store(h.value_at_quantile(0.5), Ordering::Relaxed);
            self.p95_ms.store(h.value_at_quantile(0.95), Ordering::Relaxed);
        }
    }

    pub fn last_ms(&self) -> Option<u64> {
        nonzero(&self.last_ms)
    }

    /// Return (p50_ms, p95_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>) {
        (nonzero(&self.p50_ms), nonzero(&self.p95_ms))
    }
}

fn nonzero(v: &AtomicU64) -> Option<u64> {
    match v.load(Ordering::Relaxed) {
        0 => None,
        ms => Some(ms),
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = CycleStats::new();
        assert_eq!(stats.percentiles(), (None, None));
        assert_eq!(stats.last_ms(), None);
    }

    #[test]
    fn records_last_and_percentiles() {
        let stats = CycleStats::new();
        for secs in [10, 20, 30] {
            stats.record(Duration::from_secs(secs));
        }
        assert_eq!(stats.last_ms(), Some(30_000));
        let (p50, p95) = stats.percentiles();
        let p50 = p50.unwrap();
        assert!((19_000..=21_000).contains(&p50), "p50={p50}");
        assert!(p95.unwrap() >= 29_000);
    }

    #[test]
    fn percentiles_readable_while_histogram_is_locked() {
        let stats = CycleStats::new();
        stats.record(Duration::from_secs(4));
        let _held = stats.inner.lock().unwrap();
        let (p50, p95) = stats.percentiles();
        assert!(p50.unwrap() >= 3_990);
        assert!(p95.unwrap() >= 3_990);
    }

    #[test]
    fn sub_millisecond_cycles_count_as_one_ms() {
        let stats = CycleStats::new();
        stats.record(Duration::from_micros(10));
        assert_eq!(stats.last_ms(), Some(1));
    }
}

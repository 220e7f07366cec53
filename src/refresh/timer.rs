use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct TimerSlot {
    /// Bumped on every arm and cancel. A sleeping task only fires if its
    /// generation is still the latest.
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// Single re-armable one-shot timer. Arming replaces whatever was pending,
/// so at most one firing is ever scheduled.
#[derive(Debug, Default)]
pub struct AutoRefreshTimer {
    slot: Mutex<TimerSlot>,
    /// Mirrors `slot.pending.is_some()`; written under the slot lock.
    armed: AtomicBool,
    firings: AtomicU64,
}

impl AutoRefreshTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Schedule `on_fire` after `delay`, cancelling any pending firing.
    pub fn arm<F>(self: &Arc<Self>, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.lock();
        if let Some(old) = slot.pending.take() {
            old.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        self.armed.store(true, Ordering::Release);

        let timer = Arc::clone(self);
        slot.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if timer.claim(generation) {
                timer.firings.fetch_add(1, Ordering::Relaxed);
                on_fire();
            }
        }));
    }

    /// Disarm the pending firing. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = self.lock();
        slot.generation += 1;
        self.armed.store(false, Ordering::Release);
        match slot.pending.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Number of times the timer has actually fired.
    pub fn firings(&self) -> u64 {
        self.firings.load(Ordering::Relaxed)
    }

    /// Take ownership of the firing if `generation` is still current.
    fn claim(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.pending = None;
        self.armed.store(false, Ordering::Release);
        true
    }

    fn lock(&self) -> MutexGuard<'_, TimerSlot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

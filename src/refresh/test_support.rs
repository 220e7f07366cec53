//! Scripted in-memory sources for exercising the coordinator without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::AppError;
use crate::sources::{KeySet, KeySource, ListingSource, SourceOutcome};
use crate::state::ProgressCounter;
use crate::types::Record;

pub fn key_set(slugs: &[&str]) -> KeySet {
    slugs.iter().map(|s| s.to_string()).collect()
}

/// Returns one scripted batch per call; an exhausted script yields an empty batch.
#[derive(Default)]
pub struct ScriptedListing {
    batches: Mutex<VecDeque<Vec<Record>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
    /// 1-based call numbers that fail with nothing, without consuming a batch.
    outages: Vec<usize>,
}

impl ScriptedListing {
    pub fn new(batches: Vec<Vec<Record>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Self::default()
        }
    }

    /// Each call parks until the gate is notified once.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Call number `call` fails immediately, before waiting on any gate.
    pub fn outage_on(mut self, call: usize) -> Self {
        self.outages.push(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for ScriptedListing {
    fn name(&self) -> &'static str {
        "scripted-listing"
    }

    async fn fetch_records(&self, progress: &ProgressCounter) -> SourceOutcome<Vec<Record>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.outages.contains(&call) {
            progress.set(0);
            return SourceOutcome::failed(AppError::Upstream("listing unreachable".to_string()));
        }
        let batch = {
            let mut batches = self.batches.lock().unwrap();
            batches.pop_front().unwrap_or_default()
        };
        progress.set(batch.len());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        SourceOutcome::complete(batch)
    }
}

/// `None` entries simulate an unreachable upstream.
#[derive(Default)]
pub struct ScriptedKeys {
    batches: Mutex<VecDeque<SourceOutcome<KeySet>>>,
    calls: AtomicUsize,
}

impl ScriptedKeys {
    pub fn new(batches: Vec<Option<KeySet>>) -> Self {
        let outcomes = batches
            .into_iter()
            .map(|b| match b {
                Some(keys) => SourceOutcome::complete(keys),
                None => SourceOutcome::failed(unreachable_rewards()),
            })
            .collect();
        Self::from_outcomes(outcomes)
    }

    pub fn from_outcomes(outcomes: Vec<SourceOutcome<KeySet>>) -> Self {
        Self {
            batches: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for ScriptedKeys {
    fn name(&self) -> &'static str {
        "scripted-keys"
    }

    async fn fetch_keys(&self, progress: &ProgressCounter) -> SourceOutcome<KeySet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut batches = self.batches.lock().unwrap();
            batches
                .pop_front()
                .unwrap_or_else(|| SourceOutcome::complete(KeySet::new()))
        };
        progress.set(next.items.len());
        next
    }
}

pub fn unreachable_rewards() -> AppError {
    AppError::Upstream("rewards page unreachable".to_string())
}

pub struct PanickingListing;

#[async_trait]
impl ListingSource for PanickingListing {
    fn name(&self) -> &'static str {
        "panicking-listing"
    }

    async fn fetch_records(&self, _progress: &ProgressCounter) -> SourceOutcome<Vec<Record>> {
        panic!("listing adapter blew up")
    }
}

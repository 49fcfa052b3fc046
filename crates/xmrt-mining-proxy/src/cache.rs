//! Single-slot, short-TTL memo of the last aggregator result.
//!
//! The service monitors exactly one wallet, so the slot has no key. Writes
//! replace the whole value; two overlapping cycles simply race and the last
//! `put` wins, which is fine because both read the same upstream data.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::aggregator::MiningAggregator;
use crate::metrics::{CACHE_HITS, CACHE_MISSES};
use crate::snapshot::RetrievalResult;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct Entry {
    result: Arc<RetrievalResult>,
    stored_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub cached: bool,
    pub age_millis: Option<u64>,
    pub fresh: bool,
}

pub struct SnapshotCache {
    slot: RwLock<Option<Entry>>,
    ttl: Duration,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The stored result, or `None` once its age reaches the TTL.
    pub fn get(&self) -> Option<Arc<RetrievalResult>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                CACHE_HITS.inc();
                Some(entry.result.clone())
            }
            _ => {
                CACHE_MISSES.inc();
                None
            }
        }
    }

    /// Whatever is in the slot, ignoring the TTL.
    pub fn peek(&self) -> Option<Arc<RetrievalResult>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|entry| entry.result.clone())
    }

    pub fn put(&self, result: Arc<RetrievalResult>) {
        self.put_at(result, Instant::now());
    }

    /// Stores `result` as if it had been written at `stored_at`.
    pub fn put_at(&self, result: Arc<RetrievalResult>, stored_at: Instant) {
        let entry = Entry { result, stored_at };
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(entry);
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn status(&self) -> CacheStatus {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(entry) => {
                let age = entry.stored_at.elapsed();
                CacheStatus {
                    cached: true,
                    age_millis: Some(age.as_millis() as u64),
                    fresh: age < self.ttl,
                }
            }
            None => CacheStatus {
                cached: false,
                age_millis: None,
                fresh: false,
            },
        }
    }

    /// Cache-through read: serves the slot while fresh, otherwise runs a cycle
    /// and stores it.
    pub async fn get_or_refresh(&self, aggregator: &MiningAggregator) -> Arc<RetrievalResult> {
        if let Some(result) = self.get() {
            debug!("Serving cached mining stats");
            return result;
        }
        self.refresh(aggregator).await
    }

    /// Runs a cycle regardless of the slot's age and stores it. The entry is
    /// aged from when the cycle started, so a poll interval equal to the TTL
    /// fetches on every tick.
    pub async fn refresh(&self, aggregator: &MiningAggregator) -> Arc<RetrievalResult> {
        let started = Instant::now();
        let result = Arc::new(aggregator.run().await);
        self.put_at(result.clone(), started);
        result
    }
}

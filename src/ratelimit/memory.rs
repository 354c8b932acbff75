//! In-memory counter store.
//!
//! Backs the engine in single-process deployments and in tests. Per-key
//! atomicity comes from the map's entry API: the shard lock is held for the
//! whole read-mutate-write, so concurrent callers for one key serialize.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::backend::CounterStore;
use super::counter::RateRecord;
use crate::clock::Clock;
use crate::error::Result;

/// A counter store keeping all records in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, RateRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records. Primarily useful for tests and introspection.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record whose lifetime ended at or before `now`.
    ///
    /// The engine already treats expired records as absent, so this is pure
    /// memory hygiene, equivalent to a remote store's key TTL.
    pub fn purge_expired(&self, now: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now < record.expires_at);
        let purged = before - self.records.len();
        if purged > 0 {
            debug!(purged, "Purged expired rate records");
        }
        purged
    }

    /// Spawn a background task purging expired records on an interval.
    ///
    /// The task runs until aborted via the returned handle or until the
    /// runtime shuts down.
    pub fn spawn_sweeper(
        store: Arc<Self>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.purge_expired(clock.now_millis());
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn update(
        &self,
        key: &str,
        apply: &(dyn for<'a> Fn(Option<&'a RateRecord>) -> RateRecord + Send + Sync),
    ) -> Result<RateRecord> {
        // The entry guard pins the shard for the full read-mutate-write.
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = apply(Some(occupied.get()));
                occupied.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                let next = apply(None);
                vacant.insert(next.clone());
                Ok(next)
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.records.remove(key).is_some())
    }
}

//! Counter store trait abstracting the shared storage substrate.

use async_trait::async_trait;

use super::counter::RateRecord;
use crate::error::Result;

/// The single primitive the decision engine requires from storage: apply a
/// mutation function to one key's record atomically.
///
/// This trait abstracts over the bundled [`MemoryStore`](super::MemoryStore)
/// and any linearizable key-value backend shared by multiple engine
/// instances (one Redis Lua script, one FoundationDB transaction, ...).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically replace the record under `key` with `apply(previous)` and
    /// return the stored result.
    ///
    /// For a given key the whole read-mutate-write must be linearizable:
    /// no two concurrent callers may observe the same previous record.
    /// Failures surface as `StoreUnavailable`, never as a made-up record.
    async fn update(
        &self,
        key: &str,
        apply: &(dyn for<'a> Fn(Option<&'a RateRecord>) -> RateRecord + Send + Sync),
    ) -> Result<RateRecord>;

    /// Delete the record under `key`, returning whether one existed.
    ///
    /// Must be atomic with respect to concurrent `update` calls on the same
    /// key; last-writer-wins by real-time order is acceptable.
    async fn remove(&self, key: &str) -> Result<bool>;
}

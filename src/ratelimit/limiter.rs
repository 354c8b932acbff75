//! Tiered rate limiter: the decision engine.

use std::sync::Arc;

use tracing::{debug, trace};

use super::backend::CounterStore;
use super::counter::{advance, Decision, Policy};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// The decision engine. Holds no per-key state of its own: every call is one
/// clock read plus one atomic round-trip to the counter store, so any number
/// of engine instances may share a store across processes.
pub struct TieredLimiter<S: CounterStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore> TieredLimiter<S> {
    /// Create a limiter over the given store, using the system clock.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit clock.
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The clock this limiter reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Count one request against `key` under `policy` and decide whether it
    /// may proceed.
    ///
    /// The whole window transition runs inside the store's atomic primitive;
    /// concurrent callers for the same key observe distinct, contiguous
    /// counts. Store failures propagate untouched: a failure is neither an
    /// admit nor a deny.
    pub async fn decide(&self, key: &str, policy: &Policy) -> Result<Decision> {
        let now = self.clock.now_millis();
        let tiers = policy.tiers();

        trace!(key = %key, now, "Checking rate limit");

        let record = self
            .store
            .update(key, &|prev| advance(prev, now, tiers))
            .await?;
        let decision = Decision::from_record(&record, tiers);

        if decision.remaining < 0 {
            debug!(
                key = %key,
                tier = record.tier_index,
                limit = decision.limit,
                count = record.count,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Forget all state for `key`, returning the number of records removed
    /// (0 or 1). The next `decide` for the key starts fresh at tier 0.
    pub async fn clear(&self, key: &str) -> Result<u64> {
        let removed = self.store.remove(key).await?;
        if removed {
            debug!(key = %key, "Cleared rate record");
        }
        Ok(u64::from(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RatewardenError;
    use crate::ratelimit::counter::{RateRecord, Tier};
    use crate::ratelimit::memory::MemoryStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    fn policy(pairs: &[(u64, u64)]) -> Policy {
        Policy::new(
            pairs
                .iter()
                .map(|&(l, w)| Tier::new(l, w).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn limiter(clock: Arc<ManualClock>) -> TieredLimiter<MemoryStore> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        TieredLimiter::with_clock(Arc::new(MemoryStore::new()), clock)
    }

    #[tokio::test]
    async fn test_single_tier_counts_down_then_denies() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock.clone());
        let policy = policy(&[(3, 1000)]);

        for expected in [2, 1, 0] {
            let decision = limiter.decide("k", &policy).await.unwrap();
            assert_eq!(decision.limit, 3);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.reset_at, 1000);
        }

        clock.set(500);
        let decision = limiter.decide("k", &policy).await.unwrap();
        assert_eq!(decision.remaining, -1);
        assert_eq!(decision.reset_at, 1000);
    }

    #[tokio::test]
    async fn test_escalation_ladder() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock.clone());
        let policy = policy(&[(3, 500), (2, 1000), (1, 1000)]);

        // Four calls inside the first window: limits 3, remainings 2..-1.
        let mut remainings = Vec::new();
        for _ in 0..4 {
            let d = limiter.decide("k", &policy).await.unwrap();
            assert_eq!(d.limit, 3);
            remainings.push(d.remaining);
        }
        assert_eq!(remainings, vec![2, 1, 0, -1]);

        // Quiet for >=500ms but <1000ms: escalated to the second tier.
        clock.set(600);
        let d = limiter.decide("k", &policy).await.unwrap();
        assert_eq!((d.limit, d.remaining), (2, 1));

        // Exceed the second tier inside its window.
        clock.set(700);
        limiter.decide("k", &policy).await.unwrap();
        clock.set(800);
        let d = limiter.decide("k", &policy).await.unwrap();
        assert_eq!(d.remaining, -1);

        // Quiet for >=1000ms but <2000ms: third tier.
        clock.set(1700);
        let d = limiter.decide("k", &policy).await.unwrap();
        assert_eq!((d.limit, d.remaining), (1, 0));

        // Exceed the third tier, then stay quiet past its doubled window.
        clock.set(1800);
        let d = limiter.decide("k", &policy).await.unwrap();
        assert_eq!(d.remaining, -1);
        clock.set(3700);
        let d = limiter.decide("k", &policy).await.unwrap();
        assert_eq!((d.limit, d.remaining), (3, 2));
    }

    #[tokio::test]
    async fn test_clear_then_decide_matches_fresh_key() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock.clone());
        let policy = policy(&[(2, 1000)]);

        for _ in 0..3 {
            limiter.decide("k", &policy).await.unwrap();
        }
        assert_eq!(limiter.clear("k").await.unwrap(), 1);
        assert_eq!(limiter.clear("k").await.unwrap(), 0);

        let fresh = limiter.decide("fresh", &policy).await.unwrap();
        let cleared = limiter.decide("k", &policy).await.unwrap();
        assert_eq!(cleared, fresh);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock);
        let policy = policy(&[(1, 1000)]);

        let d = limiter.decide("a", &policy).await.unwrap();
        assert_eq!(d.remaining, 0);
        limiter.decide("a", &policy).await.unwrap();

        // "a" being over limit never affects "b".
        let d = limiter.decide("b", &policy).await.unwrap();
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decides_observe_contiguous_counts() {
        const CALLERS: i64 = 50;

        let limiter = Arc::new(TieredLimiter::new(Arc::new(MemoryStore::new())));
        let policy = Arc::new(policy(&[(100, 60_000)]));

        let tasks = (0..CALLERS).map(|_| {
            let limiter = Arc::clone(&limiter);
            let policy = Arc::clone(&policy);
            tokio::spawn(async move { limiter.decide("shared", &policy).await.unwrap() })
        });

        let mut remainings = BTreeSet::new();
        for result in futures::future::join_all(tasks).await {
            let decision = result.unwrap();
            assert!(remainings.insert(decision.remaining), "duplicate count");
        }

        // Counts 1..=50 exactly once: remainings are 99 down to 50.
        let expected: BTreeSet<i64> = (100 - CALLERS..100).collect();
        assert_eq!(remainings, expected);
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn update(
            &self,
            _key: &str,
            _apply: &(dyn for<'a> Fn(Option<&'a RateRecord>) -> RateRecord + Send + Sync),
        ) -> Result<RateRecord> {
            Err(RatewardenError::StoreUnavailable("connection refused".into()))
        }

        async fn remove(&self, _key: &str) -> Result<bool> {
            Err(RatewardenError::StoreUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let limiter = TieredLimiter::new(Arc::new(FailingStore));
        let policy = policy(&[(3, 1000)]);

        let err = limiter.decide("k", &policy).await.unwrap_err();
        assert!(matches!(err, RatewardenError::StoreUnavailable(_)));

        let err = limiter.clear("k").await.unwrap_err();
        assert!(matches!(err, RatewardenError::StoreUnavailable(_)));
    }
}

//! Rate record state machine: tiers, windows, escalation.
//!
//! All transitions are pure functions of `(record, now, tiers)`, so the
//! engine's behavior is fully testable without a store. The store's only job
//! is to run [`advance`] atomically per key.

use crate::error::{RatewardenError, Result};

/// One enforcement level within a policy: at most `limit` requests per
/// fixed window of `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// Maximum requests allowed inside one window.
    pub limit: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Tier {
    /// Create a tier, rejecting zero limits and zero-length windows.
    pub fn new(limit: u64, window_ms: u64) -> Result<Self> {
        if limit == 0 {
            return Err(RatewardenError::Config(
                "tier limit must be a positive integer".into(),
            ));
        }
        if window_ms == 0 {
            return Err(RatewardenError::Config(
                "tier window must be a positive number of milliseconds".into(),
            ));
        }
        Ok(Self { limit, window_ms })
    }
}

/// An ordered, non-empty list of tiers. Tier 0 is the default entry point;
/// later tiers are reached only through escalation. The engine follows the
/// configured order and does not require later tiers to be stricter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    tiers: Vec<Tier>,
}

impl Policy {
    /// Create a policy from an ordered tier list.
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(RatewardenError::Config(
                "policy must contain at least one tier".into(),
            ));
        }
        Ok(Self { tiers })
    }

    /// Convenience constructor for a single-tier policy.
    pub fn single(limit: u64, window_ms: u64) -> Result<Self> {
        Ok(Self {
            tiers: vec![Tier::new(limit, window_ms)?],
        })
    }

    /// The ordered tier list.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }
}

/// Mutable per-key state, owned by the counter store and only ever read or
/// written inside the store's atomic primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRecord {
    /// Index of the active tier.
    pub tier_index: usize,
    /// Requests counted in the current window. Never clamped to the limit.
    pub count: u64,
    /// When the current window opened (epoch ms).
    pub window_start: u64,
    /// `window_start + tier.window_ms`. Fixed at window open; never slides.
    pub window_end: u64,
    /// Latched once `count` surpasses the active tier's limit this window.
    pub exceeded: bool,
    /// `window_start + 2 * tier.window_ms`. Past this the record is dead;
    /// the doubled lifetime is what lets one missed window still escalate.
    pub expires_at: u64,
}

impl RateRecord {
    /// Open a fresh window at the given tier, counting the current request.
    fn open(tiers: &[Tier], tier_index: usize, now: u64) -> Self {
        let tier = &tiers[tier_index];
        Self {
            tier_index,
            count: 1,
            window_start: now,
            window_end: now + tier.window_ms,
            exceeded: 1 > tier.limit,
            expires_at: now + 2 * tier.window_ms,
        }
    }
}

/// The outcome of a single `decide` call. Derived, immutable, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The active tier's limit.
    pub limit: u64,
    /// `limit - count` after this call: zero means at-limit, negative means
    /// over by that many requests.
    pub remaining: i64,
    /// When the active window closes (epoch ms).
    pub reset_at: u64,
}

impl Decision {
    /// Derive the decision from a post-transition record.
    pub fn from_record(record: &RateRecord, tiers: &[Tier]) -> Self {
        let limit = tiers[record.tier_index].limit;
        Self {
            limit,
            remaining: limit as i64 - record.count as i64,
            reset_at: record.window_end,
        }
    }
}

/// Advance the record for one request at time `now`.
///
/// `tiers` must be non-empty; [`Policy`] guarantees this for every tier
/// list the engine passes in.
///
/// Branches, in order:
/// 1. No record, or the record's lifetime is over (`now >= expires_at`), or
///    its tier index no longer exists in `tiers` (policy shrank underneath
///    it): open a fresh window at tier 0.
/// 2. Still inside the active window: count the request and latch
///    `exceeded`; window fields are untouched.
/// 3. Window closed but record still alive: escalate to the next tier if
///    this window was exceeded and a next tier exists, otherwise restore to
///    tier 0. Either way a fresh window opens at the now-active tier.
pub fn advance(prev: Option<&RateRecord>, now: u64, tiers: &[Tier]) -> RateRecord {
    match prev {
        None => RateRecord::open(tiers, 0, now),
        Some(record) if now >= record.expires_at || record.tier_index >= tiers.len() => {
            RateRecord::open(tiers, 0, now)
        }
        Some(record) if now < record.window_end => {
            let mut next = record.clone();
            next.count += 1;
            next.exceeded = next.exceeded || next.count > tiers[next.tier_index].limit;
            next
        }
        Some(record) => {
            if record.exceeded && record.tier_index + 1 < tiers.len() {
                RateRecord::open(tiers, record.tier_index + 1, now)
            } else {
                RateRecord::open(tiers, 0, now)
            }
        }
    }
}

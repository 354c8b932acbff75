//! Ratewarden - Tiered Escalating Rate Limiting
//!
//! This crate decides, per client identity and matched endpoint policy,
//! whether a request may proceed and how long a rejected caller must wait.
//! Policies are ordered lists of `(limit, window)` tiers: a client that
//! keeps exceeding a window is escalated to the next, stricter tier, and
//! drops back to the default tier after a long enough quiet period.
//!
//! The decision engine holds no local state. All counting happens inside an
//! injected [`CounterStore`](ratelimit::CounterStore), whose per-key atomic
//! primitive is the only safety boundary, so any number of processes can
//! share one set of counters. A [`MemoryStore`](ratelimit::MemoryStore) is
//! bundled for single-process use and tests; transport bindings and remote
//! store clients live outside this crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;

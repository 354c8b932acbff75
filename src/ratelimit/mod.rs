//! Rate limiting logic and state management.

mod backend;
mod counter;
mod governor;
mod limiter;
mod memory;
mod rules;

pub use backend::CounterStore;
pub use counter::{advance, Decision, Policy, RateRecord, Tier};
pub use governor::{
    Governor, IdentityFn, Outcome, RequestDescriptor, HEADER_LIMIT, HEADER_REMAINING,
    HEADER_RESET, HEADER_RETRY_AFTER, REJECT_STATUS,
};
pub use limiter::TieredLimiter;
pub use memory::MemoryStore;
pub use rules::{rate_key, PolicyMatch, PolicySet, PolicyValue};

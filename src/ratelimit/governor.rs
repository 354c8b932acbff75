//! Request governor: the protocol-independent decision pipeline.
//!
//! Transport adapters translate their framework's request object into a
//! [`RequestDescriptor`], call [`Governor::evaluate`], and render the
//! returned [`Outcome`] into protocol terms (headers, status code). No
//! decision logic belongs in an adapter.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::backend::CounterStore;
use super::counter::{Decision, Policy};
use super::limiter::TieredLimiter;
use super::rules::{rate_key, PolicySet};
use crate::clock::Clock;
use crate::config::GovernorConfig;
use crate::error::Result;

/// Header emitted with the active tier's limit.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Header emitted with `limit - count` (may be negative).
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Header emitted with the window close time in whole seconds.
pub const HEADER_RESET: &str = "x-ratelimit-reset";
/// Header emitted on rejection with the wait time in whole seconds.
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// HTTP status a transport adapter should use for [`Outcome::Reject`].
pub const REJECT_STATUS: u16 = 429;

/// Protocol-neutral description of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    /// Request method, e.g. `"GET"`.
    pub method: String,
    /// Request path, e.g. `"/books"`.
    pub path: String,
    /// Peer address as reported by the transport, if known.
    pub remote_addr: Option<String>,
    /// Request headers with lowercase names.
    pub headers: HashMap<String, String>,
}

/// Caller-supplied identity function. Returning `None` (or an empty string)
/// makes the request bypass rate limiting.
pub type IdentityFn = Arc<dyn Fn(&RequestDescriptor) -> Option<String> + Send + Sync>;

/// The governor's verdict for one request.
///
/// Store failures are not an outcome: they surface as the `Err` arm of
/// [`Governor::evaluate`], so a transport adapter must decide fail-open vs
/// fail-closed explicitly instead of inheriting a guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No identity or no matching policy: proceed, emit no metadata.
    Bypass,
    /// Within limit: proceed and emit rate metadata.
    Admit(Decision),
    /// Over limit: do not proceed; emit metadata plus retry-after.
    Reject {
        decision: Decision,
        retry_after_secs: u64,
    },
}

impl Outcome {
    /// Response metadata for this outcome, as lowercase header pairs.
    /// Empty for [`Outcome::Bypass`].
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Outcome::Bypass => Vec::new(),
            Outcome::Admit(decision) => base_headers(decision),
            Outcome::Reject {
                decision,
                retry_after_secs,
            } => {
                let mut headers = base_headers(decision);
                headers.push((HEADER_RETRY_AFTER, retry_after_secs.to_string()));
                headers
            }
        }
    }

    /// The standard deny body, present only for [`Outcome::Reject`].
    pub fn deny_message(&self) -> Option<String> {
        match self {
            Outcome::Reject {
                retry_after_secs, ..
            } => Some(format!(
                "Rate limit exceeded, retry in {} seconds",
                retry_after_secs
            )),
            _ => None,
        }
    }

    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Outcome::Reject { .. })
    }
}

fn base_headers(decision: &Decision) -> Vec<(&'static str, String)> {
    vec![
        (HEADER_LIMIT, decision.limit.to_string()),
        (HEADER_REMAINING, decision.remaining.to_string()),
        (HEADER_RESET, ceil_secs(decision.reset_at).to_string()),
    ]
}

/// Milliseconds to whole seconds, rounding up.
fn ceil_secs(millis: u64) -> u64 {
    millis.div_ceil(1000)
}

/// The request governor: policy resolution, key derivation, decision, and
/// translation into response metadata.
pub struct Governor<S: CounterStore> {
    limiter: TieredLimiter<S>,
    rules: RwLock<PolicySet>,
    identity: IdentityFn,
    namespace: String,
    default_window_ms: u64,
}

impl<S: CounterStore> Governor<S> {
    /// Build a governor from configuration. Policy validation happens here;
    /// a malformed table aborts construction and never reaches the request
    /// path.
    pub fn new(config: &GovernorConfig, store: Arc<S>, identity: IdentityFn) -> Result<Self> {
        Self::with_limiter(config, TieredLimiter::new(store), identity)
    }

    /// Build a governor with an explicit clock, for deterministic tests.
    pub fn with_clock(
        config: &GovernorConfig,
        store: Arc<S>,
        identity: IdentityFn,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_limiter(config, TieredLimiter::with_clock(store, clock), identity)
    }

    fn with_limiter(
        config: &GovernorConfig,
        limiter: TieredLimiter<S>,
        identity: IdentityFn,
    ) -> Result<Self> {
        let rules = PolicySet::from_config(&config.policy, config.default_window_ms)?;
        Ok(Self {
            limiter,
            rules: RwLock::new(rules),
            identity,
            namespace: config.key_namespace.clone(),
            default_window_ms: config.default_window_ms,
        })
    }

    /// Replace the policy table at runtime. In-flight records keep counting;
    /// a record whose tier no longer exists restarts at tier 0 on its next
    /// decision.
    pub fn set_rules(&self, table: &HashMap<String, super::rules::PolicyValue>) -> Result<()> {
        let rules = PolicySet::from_config(table, self.default_window_ms)?;
        *self.rules.write() = rules;
        Ok(())
    }

    /// Resolve policy and identity for a request. `None` means bypass.
    /// The policy is cloned out so no lock is held across store I/O.
    fn resolve(&self, request: &RequestDescriptor) -> Option<(String, Policy)> {
        let identity = (self.identity)(request).filter(|id| !id.is_empty())?;

        let rules = self.rules.read();
        let matched = rules.resolve(&request.method, &request.path)?;
        let key = rate_key(&self.namespace, &identity, matched.key);
        Some((key, matched.policy.clone()))
    }

    /// Run the full pipeline for one request: resolve policy, derive the
    /// rate key, count the request, and translate the decision.
    pub async fn evaluate(&self, request: &RequestDescriptor) -> Result<Outcome> {
        let Some((key, policy)) = self.resolve(request) else {
            trace!(method = %request.method, path = %request.path, "No policy or identity, bypassing");
            return Ok(Outcome::Bypass);
        };

        let decision = self.limiter.decide(&key, &policy).await?;
        if decision.remaining >= 0 {
            return Ok(Outcome::Admit(decision));
        }

        let now = self.limiter.clock().now_millis();
        let retry_after_secs = ceil_secs(decision.reset_at.saturating_sub(now));
        debug!(
            method = %request.method,
            path = %request.path,
            retry_after_secs,
            "Rejecting rate limited request"
        );
        Ok(Outcome::Reject {
            decision,
            retry_after_secs,
        })
    }

    /// Forget the counter the same request would be judged against, e.g.
    /// after a successful privileged action. Returns the number of records
    /// removed; 0 when resolution bypasses.
    pub async fn remove_for(&self, request: &RequestDescriptor) -> Result<u64> {
        match self.resolve(request) {
            Some((key, _)) => self.limiter.clear(&key).await,
            None => Ok(0),
        }
    }
}

//! Policy table: configuration parsing, match precedence, key derivation.
//!
//! A policy table maps match keys of the shapes `"METHOD"`, `"path"` and
//! `"METHOD path"` to tier lists. Resolution tries the most specific shape
//! first; no match means the request bypasses rate limiting entirely.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::counter::{Policy, Tier};
use crate::error::{RatewardenError, Result};

/// A policy value as written in configuration: either a bare limit (one tier
/// with the default window) or a flat even-length list read pairwise as
/// `(limit, window_ms)` in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyValue {
    /// Single-tier sugar: `"GET": 100`.
    Limit(u64),
    /// Explicit tiers: `"GET /books": [100, 60000, 50, 60000]`.
    Tiers(Vec<u64>),
}

impl PolicyValue {
    /// Expand into a validated policy.
    fn to_policy(&self, match_key: &str, default_window_ms: u64) -> Result<Policy> {
        match self {
            PolicyValue::Limit(limit) => Policy::single(*limit, default_window_ms)
                .map_err(|e| annotate(match_key, e)),
            PolicyValue::Tiers(values) => {
                if values.is_empty() || values.len() % 2 != 0 {
                    return Err(RatewardenError::Config(format!(
                        "policy for {:?} must be a non-empty, even-length list of (limit, window) pairs",
                        match_key
                    )));
                }
                let tiers = values
                    .chunks(2)
                    .map(|pair| Tier::new(pair[0], pair[1]))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| annotate(match_key, e))?;
                Policy::new(tiers)
            }
        }
    }
}

fn annotate(match_key: &str, err: RatewardenError) -> RatewardenError {
    match err {
        RatewardenError::Config(msg) => {
            RatewardenError::Config(format!("policy for {:?}: {}", match_key, msg))
        }
        other => other,
    }
}

/// A successful policy lookup: the match key that won and its tiers.
#[derive(Debug, Clone, Copy)]
pub struct PolicyMatch<'a> {
    /// The table key that matched, e.g. `"GET /books"`.
    pub key: &'a str,
    /// The tiers configured under that key.
    pub policy: &'a Policy,
}

/// A validated, immutable policy table.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySet {
    policies: HashMap<String, Policy>,
}

impl PolicySet {
    /// Build a policy set from a configuration table, expanding bare limits
    /// with `default_window_ms`. An empty table is a configuration error:
    /// a governor with nothing to enforce is a misconfiguration, not a
    /// universal bypass.
    pub fn from_config(
        table: &HashMap<String, PolicyValue>,
        default_window_ms: u64,
    ) -> Result<Self> {
        if table.is_empty() {
            return Err(RatewardenError::Config(
                "policy table must not be empty".into(),
            ));
        }
        if default_window_ms == 0 {
            return Err(RatewardenError::Config(
                "default_window_ms must be positive".into(),
            ));
        }

        let mut policies = HashMap::with_capacity(table.len());
        for (match_key, value) in table {
            policies.insert(match_key.clone(), value.to_policy(match_key, default_window_ms)?);
        }
        Ok(Self { policies })
    }

    /// Find the policy governing `method` + `path`.
    ///
    /// Precedence, most specific first: exact `"METHOD path"`, then the path
    /// alone, then the method alone. First match wins.
    pub fn resolve(&self, method: &str, path: &str) -> Option<PolicyMatch<'_>> {
        let exact = format!("{} {}", method, path);
        for candidate in [exact.as_str(), path, method] {
            if let Some((key, policy)) = self.policies.get_key_value(candidate) {
                return Some(PolicyMatch {
                    key: key.as_str(),
                    policy,
                });
            }
        }
        None
    }

    /// Number of configured policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the set holds no policies. Unreachable through
    /// `from_config`, which rejects empty tables.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Derive the shared-store key for an identity under a matched policy.
///
/// Format: `"{namespace}:{identity}{matched_key}"`. The namespace isolates
/// this governor's records from other users of the store; identity and
/// matched key concatenate so every (client, policy) pair counts alone.
pub fn rate_key(namespace: &str, identity: &str, matched_key: &str) -> String {
    format!("{}:{}{}", namespace, identity, matched_key)
}

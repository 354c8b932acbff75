//! Configuration for the request governor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RatewardenError, Result};
use crate::ratelimit::PolicyValue;

/// Governor configuration.
///
/// The policy table maps match keys (`"METHOD"`, `"path"`, `"METHOD path"`)
/// to either a bare limit or a flat `(limit, window_ms)` list:
///
/// ```yaml
/// key_namespace: LIMIT
/// default_window_ms: 60000
/// policy:
///   GET: 100
///   "POST /books": [20, 60000, 5, 120000]
/// ```
///
/// Values are validated when the table is turned into a policy set at
/// governor construction, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Prefix isolating this governor's records inside the shared store.
    #[serde(default = "default_key_namespace")]
    pub key_namespace: String,

    /// Window length applied when a policy value is a bare limit.
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// Match key to policy value table.
    #[serde(default)]
    pub policy: HashMap<String, PolicyValue>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            key_namespace: default_key_namespace(),
            default_window_ms: default_window_ms(),
            policy: HashMap::new(),
        }
    }
}

fn default_key_namespace() -> String {
    "LIMIT".to_string()
}

fn default_window_ms() -> u64 {
    3_600_000 // one hour
}

impl GovernorConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RatewardenError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RatewardenError::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
key_namespace: API
default_window_ms: 60000
policy:
  GET: 100
  "POST /books": [20, 60000, 5, 120000]
"#;
        let config = GovernorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.key_namespace, "API");
        assert_eq!(config.default_window_ms, 60_000);
        assert_eq!(config.policy["GET"], PolicyValue::Limit(100));
        assert_eq!(
            config.policy["POST /books"],
            PolicyValue::Tiers(vec![20, 60_000, 5, 120_000])
        );
    }

    #[test]
    fn test_parse_json_config() {
        let json = r#"{
            "policy": { "GET /": 5 }
        }"#;
        let config = GovernorConfig::from_json(json).unwrap();
        assert_eq!(config.policy["GET /"], PolicyValue::Limit(5));
    }

    #[test]
    fn test_defaults_match_the_classic_limiter() {
        let config = GovernorConfig::from_yaml("policy:\n  GET: 1\n").unwrap();
        assert_eq!(config.key_namespace, "LIMIT");
        assert_eq!(config.default_window_ms, 3_600_000);
    }

    #[test]
    fn test_invalid_yaml_is_a_config_error() {
        let err = GovernorConfig::from_yaml("policy: [not, a, map").unwrap_err();
        assert!(matches!(err, RatewardenError::Config(_)));
    }
}

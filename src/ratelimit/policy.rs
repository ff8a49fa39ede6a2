//! Rate limit policy configuration and lookup.
//!
//! This module turns the per-type policy mapping loaded at startup into an
//! immutable registry. Type names are matched case-insensitively.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use super::key::KEY_SEPARATOR;
use crate::error::{GatekeeperError, Result};

/// A policy entry as it appears in configuration.
///
/// Values are signed so that a negative limit surfaces as a policy error
/// instead of a deserialisation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Number of requests allowed per window
    #[serde(alias = "Limit")]
    pub limit: i64,
    /// Window length in seconds. The lowercase aliases cover sources that
    /// fold key case, such as the layered config loader.
    #[serde(
        alias = "windowSeconds",
        alias = "windowseconds",
        alias = "WindowInSeconds",
        alias = "windowinseconds"
    )]
    pub window_seconds: i64,
}

impl PolicyRule {
    pub fn new(limit: i64, window_seconds: i64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }
}

/// A validated rate limit policy for one notification type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    type_name: String,
    max_count: u64,
    window_seconds: u64,
}

impl RateLimitPolicy {
    /// The normalised (lowercase) type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Maximum number of requests admitted per window.
    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    /// Window length in whole seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Immutable mapping of notification type to policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, RateLimitPolicy>,
}

impl PolicyRegistry {
    /// Build a registry from a type -> rule mapping.
    ///
    /// Fails if any rule has a non-positive limit or window, if a type name is
    /// empty or contains the counter key separator, or if two names differ
    /// only by case.
    pub fn new<I, S>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, PolicyRule)>,
        S: AsRef<str>,
    {
        let mut policies = HashMap::new();

        for (name, rule) in rules {
            let name = name.as_ref();
            let policy = Self::validate(name, rule)?;

            if policies.contains_key(policy.type_name()) {
                return Err(GatekeeperError::Policy(format!(
                    "duplicate notification type '{}' (type names are case-insensitive)",
                    name
                )));
            }

            policies.insert(policy.type_name.clone(), policy);
        }

        info!(types = policies.len(), "Rate limit policies loaded");

        Ok(Self { policies })
    }

    /// Parse a YAML mapping of `type: { limit, window_seconds }`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: HashMap<String, PolicyRule> = serde_yaml::from_str(yaml).map_err(|e| {
            GatekeeperError::Config(format!("Failed to parse rate limit policies: {}", e))
        })?;
        Self::new(rules)
    }

    fn validate(name: &str, rule: PolicyRule) -> Result<RateLimitPolicy> {
        let type_name = name.trim().to_lowercase();

        if type_name.is_empty() {
            return Err(GatekeeperError::Policy(
                "notification type name must not be empty".to_string(),
            ));
        }
        if type_name.contains(KEY_SEPARATOR) {
            return Err(GatekeeperError::Policy(format!(
                "notification type '{}' must not contain '{}'",
                name, KEY_SEPARATOR
            )));
        }
        if rule.limit <= 0 {
            return Err(GatekeeperError::Policy(format!(
                "limit for '{}' must be positive, got {}",
                name, rule.limit
            )));
        }
        if rule.window_seconds <= 0 {
            return Err(GatekeeperError::Policy(format!(
                "window_seconds for '{}' must be positive, got {}",
                name, rule.window_seconds
            )));
        }

        Ok(RateLimitPolicy {
            type_name,
            max_count: rule.limit as u64,
            window_seconds: rule.window_seconds as u64,
        })
    }

    /// Find the policy for a notification type.
    pub fn lookup(&self, type_name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(&type_name.to_lowercase())
    }

    /// Whether a policy exists for the notification type.
    pub fn is_known_type(&self, type_name: &str) -> bool {
        self.lookup(type_name).is_some()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PolicyRegistry {
        PolicyRegistry::new([
            ("Status", PolicyRule::new(2, 60)),
            ("news", PolicyRule::new(1, 86400)),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = registry();

        let policy = registry.lookup("status").unwrap();
        assert_eq!(policy.type_name(), "status");
        assert_eq!(policy.max_count(), 2);
        assert_eq!(policy.window_seconds(), 60);

        assert!(registry.is_known_type("STATUS"));
        assert!(registry.is_known_type("News"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = registry();
        assert!(registry.lookup("marketing").is_none());
        assert!(!registry.is_known_type("InvalidType"));
        assert!(!registry.is_known_type(""));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
status:
  limit: 2
  window_seconds: 60
marketing:
  limit: 3
  windowSeconds: 3600
"#;
        let registry = PolicyRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.type_names(), vec!["marketing", "status"]);
        assert_eq!(
            registry.lookup("marketing").unwrap().window(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_rejects_non_positive_limit() {
        let err = PolicyRegistry::new([("status", PolicyRule::new(0, 60))]).unwrap_err();
        assert!(matches!(err, GatekeeperError::Policy(_)));

        let err = PolicyRegistry::new([("status", PolicyRule::new(-5, 60))]).unwrap_err();
        assert!(matches!(err, GatekeeperError::Policy(_)));
    }

    #[test]
    fn test_rejects_non_positive_window() {
        let err = PolicyRegistry::new([("status", PolicyRule::new(2, 0))]).unwrap_err();
        assert!(matches!(err, GatekeeperError::Policy(_)));
    }

    #[test]
    fn test_rejects_bad_type_names() {
        assert!(PolicyRegistry::new([("", PolicyRule::new(1, 1))]).is_err());
        assert!(PolicyRegistry::new([("a:b", PolicyRule::new(1, 1))]).is_err());
        assert!(PolicyRegistry::new([
            ("Status", PolicyRule::new(1, 1)),
            ("status", PolicyRule::new(2, 2)),
        ])
        .is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = PolicyRegistry::from_yaml("status: [1, 2").unwrap_err();
        assert!(matches!(err, GatekeeperError::Config(_)));
    }
}

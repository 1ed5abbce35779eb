//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::NavigationError;

/// Default tolerance for decimal `equal` comparisons
pub const DEFAULT_DECIMAL_ACCURACY: f64 = 0.00001;

/// How a step resolves several survey rules firing with different targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Conflicting targets cancel out and default ordering applies
    #[default]
    NoOverride,
    /// The first target in field and rule declaration order wins
    FirstMatch,
}

/// Tunables shared by every navigation query of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_decimal_accuracy")]
    pub decimal_accuracy: f64,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn default_decimal_accuracy() -> f64 {
    DEFAULT_DECIMAL_ACCURACY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decimal_accuracy: DEFAULT_DECIMAL_ACCURACY,
            conflict_policy: ConflictPolicy::NoOverride,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decimal_accuracy(mut self, accuracy: f64) -> Self {
        self.decimal_accuracy = accuracy.abs();
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, NavigationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, NavigationError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.conflict_policy, ConflictPolicy::NoOverride);
    }

    #[test]
    fn test_builder_and_json() {
        let config = EngineConfig::new()
            .with_decimal_accuracy(-0.01)
            .with_conflict_policy(ConflictPolicy::FirstMatch);
        assert_eq!(config.decimal_accuracy, 0.01);

        let json = config.to_json().unwrap();
        assert!(json.contains("\"conflictPolicy\":\"firstMatch\""));
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}

//! Machine configuration.
//!
//! Configuration is an explicit value handed to
//! [`StateMachine::with_config`](crate::machine::StateMachine::with_config).
//! It can be built in code or loaded from JSON.
//!
//! # Example
//!
//! ```rust
//! use hierarch::config::{MachineConfig, SwitchPolicy};
//!
//! let config = MachineConfig::from_json(r#"{ "name": "door", "switch_policy": "sibling" }"#)
//!     .unwrap();
//!
//! assert_eq!(config.name.as_deref(), Some("door"));
//! assert_eq!(config.switch_policy, SwitchPolicy::Sibling);
//! assert_eq!(config.history_limit, 64);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default number of transition records retained by a machine.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// Which targets a transition may switch to from the current active path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPolicy {
    /// Any state: the path is exited up to the least common ancestor of
    /// the active leaf and the target, then entered down to the target.
    #[default]
    LeastCommonAncestor,

    /// Only roots, active states, and children of active states. Other
    /// targets are ignored without any callback running.
    Sibling,
}

/// Settings for a single machine instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Label attached to log events
    pub name: Option<String>,
    /// Reachability rule for transition targets
    pub switch_policy: SwitchPolicy,
    /// Maximum transition records kept; 0 disables recording
    pub history_limit: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: None,
            switch_policy: SwitchPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl MachineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_switch_policy(mut self, policy: SwitchPolicy) -> Self {
        self.switch_policy = policy;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_least_common_ancestor() {
        let config = MachineConfig::default();
        assert_eq!(config.switch_policy, SwitchPolicy::LeastCommonAncestor);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert!(config.name.is_none());
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config = MachineConfig::from_json("{}").unwrap();
        assert_eq!(config, MachineConfig::default());
    }

    #[test]
    fn builder_methods_override_fields() {
        let config = MachineConfig::new()
            .with_name("elevator")
            .with_switch_policy(SwitchPolicy::Sibling)
            .with_history_limit(0);

        assert_eq!(config.name.as_deref(), Some("elevator"));
        assert_eq!(config.switch_policy, SwitchPolicy::Sibling);
        assert_eq!(config.history_limit, 0);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = MachineConfig::from_json(r#"{ "switch_policy": "anywhere" }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = MachineConfig::new().with_name("pump").with_history_limit(8);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(MachineConfig::from_json(&json).unwrap(), config);
    }
}

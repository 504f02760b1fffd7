//! Scheduler and host configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use lanequeue_core::DEFAULT_LANE;

/// How lanes are keyed to their owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerScope {
    /// Every module instance gets its own lanes.
    #[default]
    Instance,
    /// All instances of one module type share their lanes.
    Type,
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerScope::Instance => write!(f, "instance"),
            OwnerScope::Type => write!(f, "type"),
        }
    }
}

impl FromStr for OwnerScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instance" => Ok(OwnerScope::Instance),
            "type" => Ok(OwnerScope::Type),
            other => Err(format!("unknown owner scope '{}'", other)),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Lane used by the convenience enqueue forms.
    pub default_lane: String,

    /// Whether lanes belong to a module instance or to its type.
    pub owner_scope: OwnerScope,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_lane: DEFAULT_LANE.to_string(),
            owner_scope: OwnerScope::Instance,
        }
    }
}

/// Configuration for the reference tick host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Upper bound on ticks for `run_until_idle`.
    pub max_ticks: u64,

    /// Wall-clock pacing between ticks when driven by a timer (milliseconds).
    pub tick_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_ticks: 10_000,
            tick_interval_ms: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.default_lane, "default");
        assert_eq!(config.owner_scope, OwnerScope::Instance);
        assert_eq!(HostConfig::default().tick_interval_ms, 16);
    }

    #[test]
    fn test_owner_scope_parse() {
        assert_eq!("Type".parse::<OwnerScope>(), Ok(OwnerScope::Type));
        assert_eq!("instance".parse::<OwnerScope>(), Ok(OwnerScope::Instance));
        assert!("global".parse::<OwnerScope>().is_err());
    }
}

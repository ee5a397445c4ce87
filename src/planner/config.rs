//! Planner configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Planner limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Longest window accepted for correlation and filtered aggregation
    /// (default: 7 days)
    #[serde(default = "default_max_window_secs")]
    pub max_window_secs: u64,

    /// Time allowed for each store call (default: 30s)
    #[serde(default = "default_store_call_timeout_ms")]
    pub store_call_timeout_ms: u64,

    /// Row cap when a request sets none; 0 means unlimited
    #[serde(default)]
    pub default_limit: usize,
}

fn default_max_window_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_store_call_timeout_ms() -> u64 {
    30_000
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_window_secs: default_max_window_secs(),
            store_call_timeout_ms: default_store_call_timeout_ms(),
            default_limit: 0,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_window_secs == 0 {
            return Err("max_window_secs must be > 0".into());
        }
        if self.max_window_secs > i64::MAX as u64 / 1000 {
            return Err("max_window_secs is too large".into());
        }
        if self.store_call_timeout_ms == 0 {
            return Err("store_call_timeout_ms must be > 0".into());
        }
        Ok(())
    }

    pub fn max_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_window_secs as i64)
    }

    pub fn store_call_timeout(&self) -> Duration {
        Duration::from_millis(self.store_call_timeout_ms)
    }

    /// Explicit limit, else the configured default, else none
    pub fn effective_limit(&self, requested: Option<usize>) -> Option<usize> {
        requested.or(match self.default_limit {
            0 => None,
            n => Some(n),
        })
    }
}

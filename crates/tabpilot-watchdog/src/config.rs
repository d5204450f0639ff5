//! Watchdog configuration.

use serde::{Deserialize, Serialize};

/// Watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Per-attempt deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt (attempts = retries + 1).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Heartbeat interval while an attempt is in flight, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Backoff base in milliseconds; delay = base * 2^(attempt - 1).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retries() -> u32 {
    2
}

fn default_heartbeat_interval_ms() -> u64 {
    1_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

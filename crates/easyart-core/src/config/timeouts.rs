//! Timeouts used by the client's lifecycle handling
//!
//! Calls themselves have no built-in timeout; callers bound them with a
//! cancellation token. These values only bound teardown and supply the
//! advisory default for model switching.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on the graceful `local_sd.shutdown` call during teardown
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Default bound on joining each background loop
pub const JOIN_TIMEOUT_SECS: u64 = 2;

/// Default time to wait for the process to exit after a kill
pub const KILL_WAIT_SECS: u64 = 5;

/// Default advisory timeout sent with `local_sd.switch_model`
pub const SWITCH_MODEL_SECS: u64 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    #[serde(with = "humantime_serde")]
    pub join_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub kill_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub switch_model: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(SHUTDOWN_GRACE_SECS),
            join_timeout: Duration::from_secs(JOIN_TIMEOUT_SECS),
            kill_wait: Duration::from_secs(KILL_WAIT_SECS),
            switch_model: Duration::from_secs(SWITCH_MODEL_SECS),
        }
    }
}

impl TimeoutConfig {
    /// Merge with another config; zero durations do not override
    pub fn merge(&mut self, other: TimeoutConfig) {
        if !other.shutdown_grace.is_zero() {
            self.shutdown_grace = other.shutdown_grace;
        }
        if !other.join_timeout.is_zero() {
            self.join_timeout = other.join_timeout;
        }
        if !other.kill_wait.is_zero() {
            self.kill_wait = other.kill_wait;
        }
        if !other.switch_model.is_zero() {
            self.switch_model = other.switch_model;
        }
    }
}

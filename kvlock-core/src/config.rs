use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Lock tuning shared by every guarded flow.
///
/// Durations are plain milliseconds so the struct reads naturally from YAML:
///
/// ```yaml
/// lock:
///   ttl_ms: 10000
///   max_attempts: 2
///   retry_delay_ms: 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a lock entry if it is never released.
    pub ttl_ms: u64,
    /// Total probes per acquisition, including the first.
    pub max_attempts: u32,
    /// Pause between contended probes.
    pub retry_delay_ms: u64,
    /// Optional bound on the whole acquisition, measured from its start.
    pub deadline_ms: Option<u64>,
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10_000,
            max_attempts: 2,
            retry_delay_ms: 100,
            deadline_ms: None,
        }
    }
}

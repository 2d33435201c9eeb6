//! Bounded polling for deploy results.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How often and how long to wait for a deploy's result to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Pause between probes, in milliseconds.
    pub interval_ms: u64,
    /// Probes made before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    /// Pause between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Run `probe` until it yields a value, fails, or attempts run out.
    ///
    /// `probe` receives the 1-based attempt number. Exhaustion yields
    /// `Ok(None)`; the caller decides which timeout error to raise.
    pub async fn run<T, E, F, Fut>(&self, mut probe: F) -> Result<Option<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.interval()).await;
            }
            if let Some(value) = probe(attempt).await? {
                return Ok(Some(value));
            }
            debug!(attempt, max = self.max_attempts, "result not available yet");
        }
        Ok(None)
    }
}

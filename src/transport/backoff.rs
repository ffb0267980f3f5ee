use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff applied while reopening a broken port.
///
/// The delay doubles after every attempt and never exceeds `max_delay_ms`.
/// `max_attempts` is the total number of reopen attempts, each preceded by
/// its delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay to wait before each attempt, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_delay_ms;
        std::iter::successors(Some(self.initial_delay_ms.min(max)), move |delay| {
            Some(delay.saturating_mul(2).min(max))
        })
        .take(self.max_attempts as usize)
        .map(Duration::from_millis)
    }
}

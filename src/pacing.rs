//! Jittered human-pacing delays.
//!
//! Every deliberate pause in a run (between scrolls, batches, queries and
//! targets) is a [`DelayRange`] sampled uniformly at random.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::debug;

/// Inclusive millisecond range. Spelled `[min, max]` in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[u64; 2]")]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl From<[u64; 2]> for DelayRange {
    fn from([a, b]: [u64; 2]) -> Self {
        DelayRange::new(a, b)
    }
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        if min_ms <= max_ms {
            Self { min_ms, max_ms }
        } else {
            Self { min_ms: max_ms, max_ms: min_ms }
        }
    }

    pub fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    pub fn zero() -> Self {
        Self::fixed(0)
    }

    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }

    /// Sleep for a sampled duration and return how long that was.
    pub async fn pause(&self, reason: &str) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!("Pausing {}ms {}", delay.as_millis(), reason);
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

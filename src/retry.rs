//! Reusable retry policy with configurable backoff.
//!
//! A [`RetryPolicy`] knows nothing about what it retries. Callers hand
//! [`RetryPolicy::run`] an operation that receives the current [`Attempt`]
//! (so it can act differently on the last one) and get back the final value
//! together with the number of attempts spent.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same base delay before every retry
    #[default]
    Fixed,
    /// base * attempt
    Linear,
    /// base * 2^(attempt-1)
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = 1 + max_retries.
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    pub base_delay_ms: u64,
    /// Uniform random extra delay in [0, jitter_ms] added to every backoff.
    #[serde(default)]
    pub jitter_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: BackoffStrategy::Fixed,
            base_delay_ms: 2000,
            jitter_ms: 2000,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Position of the current try within the budget. `number` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub is_last: bool,
}

/// A final value tagged with the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn no_delay(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::Fixed,
            base_delay_ms: 0,
            jitter_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic part of the delay after failed attempt `attempt` (1-indexed).
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.base_delay_ms;
        let ms = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };
        Duration::from_millis(ms.min(self.max_delay_ms.max(base)))
    }

    /// Backoff plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.calculate_backoff_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Run `operation` until it succeeds or the budget is spent.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<Attempted<T>, Attempted<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let total = self.total_attempts();
        let mut number = 0;

        loop {
            number += 1;
            let attempt = Attempt {
                number,
                is_last: number >= total,
            };

            match operation(attempt).await {
                Ok(value) => return Ok(Attempted { value, attempts: number }),
                Err(e) if attempt.is_last => {
                    warn!("All {} attempts exhausted: {}", total, e);
                    return Err(Attempted { value: e, attempts: number });
                }
                Err(e) => {
                    let delay = self.delay_for(number);
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?} with {:?} backoff",
                        number, total, e, delay, self.backoff
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(backoff: BackoffStrategy, max_delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff,
            base_delay_ms: 1000,
            jitter_ms: 0,
            max_delay_ms,
        }
    }

    #[test]
    fn test_backoff_calculation_fixed() {
        let p = policy(BackoffStrategy::Fixed, 30000);
        assert_eq!(p.calculate_backoff_delay(0), Duration::ZERO);
        assert_eq!(p.calculate_backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(p.calculate_backoff_delay(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_calculation_linear() {
        let p = policy(BackoffStrategy::Linear, 30000);
        assert_eq!(p.calculate_backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(p.calculate_backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(p.calculate_backoff_delay(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_backoff_calculation_exponential() {
        let p = policy(BackoffStrategy::Exponential, 30000);
        assert_eq!(p.calculate_backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(p.calculate_backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(p.calculate_backoff_delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_max_cap() {
        let p = policy(BackoffStrategy::Exponential, 5000);
        assert_eq!(p.calculate_backoff_delay(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_in_window() {
        let p = RetryPolicy::default();
        for _ in 0..100 {
            let d = p.delay_for(1).as_millis();
            assert!((2000..=4000).contains(&d), "{} outside 2000..=4000", d);
        }
    }

    #[tokio::test]
    async fn test_run_spends_full_budget_on_persistent_failure() {
        let calls = AtomicU32::new(0);
        let lasts = AtomicU32::new(0);
        let result: Result<Attempted<()>, Attempted<String>> = RetryPolicy::no_delay(2)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt.is_last {
                    lasts.fetch_add(1, Ordering::SeqCst);
                }
                async move { Err(format!("attempt {}", attempt.number)) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.value, "attempt 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(lasts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_first_success() {
        let result: Result<Attempted<u32>, Attempted<String>> = RetryPolicy::no_delay(5)
            .run(|attempt| async move {
                if attempt.number == 2 {
                    Ok(42)
                } else {
                    Err("not yet".to_string())
                }
            })
            .await;
        assert_eq!(result.unwrap(), Attempted { value: 42, attempts: 2 });
    }
}

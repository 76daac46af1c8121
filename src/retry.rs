//! Bounded retries for registry calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    interval: Duration,
    max_interval: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    /// `attempts` counts the first call; zero is treated as one.
    pub fn new(attempts: u32, interval: Duration, max_interval: Duration, backoff: Backoff) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
            max_interval,
            backoff,
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.interval.saturating_mul(factor)
            }
        };
        delay.min(self.max_interval)
    }

    /// Runs `op` until it succeeds or the attempts are used up, returning
    /// the last error in the latter case.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, self.attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

// Bounded polling for conditions that become true out of our control
//
// Cooperative sleep-then-recheck on the tokio timer. One predicate per call;
// predicate errors end the wait immediately instead of counting as "not yet".

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from_millis(DEFAULT_TIMEOUT_MS, DEFAULT_INTERVAL_MS)
    }
}

impl PollConfig {
    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
        }
    }
}

/// Result of evaluating a predicate once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub satisfied: bool,
    /// Rendering of what was observed, reported on timeout
    pub observed: Option<String>,
}

impl Probe {
    pub fn new(satisfied: bool, observed: impl ToString) -> Self {
        Self {
            satisfied,
            observed: Some(observed.to_string()),
        }
    }
}

impl From<bool> for Probe {
    fn from(satisfied: bool) -> Self {
        Self {
            satisfied,
            observed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSuccess {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Error, PartialEq)]
pub enum PollError<E> {
    #[error("condition not met after {}ms ({attempts} polls)", .elapsed.as_millis())]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last_observed: Option<String>,
    },
    #[error("predicate failed: {0}")]
    Predicate(E),
}

#[derive(Debug, Clone, Default)]
pub struct ConditionPoller {
    config: PollConfig,
}

impl ConditionPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Wait until `predicate` returns true or the timeout elapses
    pub async fn await_condition<F, Fut, E>(&self, mut predicate: F) -> Result<PollSuccess, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        self.await_probe(move || {
            let check = predicate();
            async move { check.await.map(Probe::from) }
        })
        .await
    }

    /// Like [`await_condition`](Self::await_condition), keeping the last
    /// observed value for the timeout report
    pub async fn await_probe<F, Fut, E>(&self, mut probe: F) -> Result<PollSuccess, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe, E>>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = probe().await.map_err(PollError::Predicate)?;

            if result.satisfied {
                let elapsed = start.elapsed();
                debug!(attempts, elapsed_ms = elapsed.as_millis() as u64, "Condition met");
                return Ok(PollSuccess { attempts, elapsed });
            }

            let elapsed = start.elapsed();
            if elapsed >= self.config.timeout {
                warn!(
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    last_observed = ?result.observed,
                    "Condition not met before timeout"
                );
                return Err(PollError::Timeout {
                    elapsed,
                    attempts,
                    last_observed: result.observed,
                });
            }

            debug!(attempts, observed = ?result.observed, "Condition not met yet");
            sleep(self.config.interval).await;
        }
    }
}

//! Retry with exponential backoff for transient failures
//!
//! Bounds the attempts of one logical call. Only retryable outcomes are
//! reattempted; success and terminal failures return immediately. Waiting
//! between attempts races against the caller's cancellation signal.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tracing::warn;

use super::cancel::CancellationSignal;
use crate::error::{CallOutcome, ServiceError};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per logical call, the first one included
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_interval: Duration,

    /// Maximum backoff duration
    pub max_interval: Duration,

    /// Multiplier for backoff between retries
    pub multiplier: f64,

    /// Jitter applied to each interval (0.0 disables it)
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            randomization_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Constant spacing between attempts, no jitter
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval: delay,
            max_interval: delay,
            multiplier: 1.0,
            randomization_factor: 0.0,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            // the attempt budget bounds the call, not wall-clock time
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_attempts: {}, initial_interval: {:?}, max_interval: {:?}, multiplier: {}, randomization_factor: {} }}",
            self.max_attempts,
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            self.randomization_factor
        )
    }
}

/// Executor for retry operations with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `attempt` until it succeeds, fails terminally, or the budget is spent.
    ///
    /// Exhausting the budget returns the last retryable failure. Cancellation
    /// during an attempt or a back-off wait returns a terminal `Cancelled`.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationSignal, mut attempt: F) -> CallOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.backoff();
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return cancelled_outcome(cancel, attempts);
            }
            attempts += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled_outcome(cancel, attempts),
                outcome = attempt(attempts) => outcome,
            };

            let err = match outcome {
                CallOutcome::RetryableFailure(err) => err,
                other => return other,
            };

            if attempts >= max_attempts {
                return CallOutcome::RetryableFailure(err.with_context_value("attempts", attempts));
            }

            let delay = backoff.next_backoff().unwrap_or(self.config.max_interval);
            warn!(
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable failure, backing off before next attempt"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled_outcome(cancel, attempts),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

fn cancelled_outcome<T>(cancel: &CancellationSignal, attempts: u32) -> CallOutcome<T> {
    CallOutcome::TerminalFailure(
        ServiceError::cancelled(cancel.reason()).with_context_value("attempts", attempts),
    )
}

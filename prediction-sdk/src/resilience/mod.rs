//! Resilience patterns for the prediction client
//!
//! This module provides:
//! - Retry with exponential backoff, bounded by an attempt budget
//! - A ratio-based circuit breaker with half-open trials
//! - Caller-driven cancellation
//! - The `Resilience` composition: breaker admission, then retry, then
//!   recording the call's result on the breaker

mod cancel;
mod circuit_breaker;
mod retry;
mod window;

pub use cancel::{CancellationHandle, CancellationSignal};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitSnapshot};
pub use retry::{RetryConfig, RetryExecutor};
pub use window::FailureWindow;

use std::future::Future;
use std::sync::Arc;

use crate::error::CallOutcome;

/// Composition of one retry policy with one (possibly shared) circuit breaker
#[derive(Debug, Clone)]
pub struct Resilience {
    retry: RetryExecutor,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl Resilience {
    pub fn new(retry_config: RetryConfig, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            retry: RetryExecutor::new(retry_config),
            circuit_breaker,
        }
    }

    /// Run one logical call.
    ///
    /// A rejected admission returns a terminal `CircuitOpen` failure without
    /// invoking `attempt`. Otherwise the retried result is recorded once on
    /// the breaker: success and retryable failure feed the window, terminal
    /// failures only release the admission.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationSignal, attempt: F) -> CallOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let permit = match self.circuit_breaker.check() {
            Ok(permit) => permit,
            Err(rejection) => return CallOutcome::TerminalFailure(rejection),
        };

        let mut admission = Admission::new(&self.circuit_breaker, permit);
        let outcome = self.retry.execute(cancel, attempt).await;

        match &outcome {
            CallOutcome::Success(_) => admission.settle(Settlement::Success),
            CallOutcome::RetryableFailure(_) => admission.settle(Settlement::Failure),
            CallOutcome::TerminalFailure(_) => admission.settle(Settlement::Ignored),
        }
        outcome
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }
}

enum Settlement {
    Success,
    Failure,
    Ignored,
}

/// An admitted call; released as ignored if dropped before settling
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    permit: CircuitPermit,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker, permit: CircuitPermit) -> Self {
        Self {
            breaker,
            permit,
            settled: false,
        }
    }

    fn settle(&mut self, settlement: Settlement) {
        self.settled = true;
        match settlement {
            Settlement::Success => self.breaker.record_success(self.permit),
            Settlement::Failure => self.breaker.record_failure(self.permit),
            Settlement::Ignored => self.breaker.record_ignored(self.permit),
        }
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_ignored(self.permit);
        }
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,

    /// Calls are rejected locally
    Open,

    /// A limited number of trial calls pass through
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

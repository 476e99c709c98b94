//! Circuit breaker for the prediction service
//!
//! Tracks the results of recent logical calls in a [`FailureWindow`] and
//! opens when the failure ratio exceeds the configured threshold. While open,
//! calls are rejected locally. After the cooldown a limited number of trial
//! calls are let through: one success closes the circuit, one failure
//! reopens it.
//!
//! State and window live behind one mutex so each admission and each
//! recorded result is a single atomic update. Every transition starts a new
//! generation; a result is only applied to the generation that admitted it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use metrics::increment_counter;
use tracing::{debug, info, warn};

use super::window::FailureWindow;
use super::CircuitState;
use crate::error::{Result, ServiceError};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0-1.0) that must be exceeded to open the circuit
    pub failure_ratio_threshold: f64,

    /// Number of recent results kept in the window
    pub window_size: usize,

    /// Results required in the window before the ratio is evaluated
    pub minimum_samples: usize,

    /// Time spent open before trial calls are allowed
    pub cooldown: Duration,

    /// Trial calls admitted concurrently while half-open
    pub half_open_trials: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: 0.5,
            window_size: 10,
            minimum_samples: 10,
            cooldown: Duration::from_secs(30),
            half_open_trials: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    window: FailureWindow,
    opened_at: Option<Instant>,
    trials_in_flight: usize,
    rejected: u64,
    generation: u64,
}

/// Proof of admission returned by [`CircuitBreaker::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPermit {
    generation: u64,
    trial: bool,
}

impl CircuitPermit {
    /// Breaker generation the call was admitted under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the call was admitted as a half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

/// A thread-safe circuit breaker shared by every call of one operation family
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = FailureWindow::new(config.window_size);
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                status: CircuitState::Closed,
                window,
                opened_at: None,
                trials_in_flight: 0,
                rejected: 0,
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admit or reject a call. Moves Open to HalfOpen once the cooldown has elapsed.
    pub fn check(&self) -> Result<CircuitPermit> {
        let mut state = self.lock();

        if state.status == CircuitState::Open {
            let cooled_down = state
                .opened_at
                .map(|at| at.elapsed() >= self.config.cooldown)
                .unwrap_or(true);

            if !cooled_down {
                self.count_rejection(&mut state);
                let remaining = state
                    .opened_at
                    .map(|at| self.config.cooldown.saturating_sub(at.elapsed()))
                    .unwrap_or_default();
                return Err(ServiceError::circuit_open(format!(
                    "circuit '{}' is open for another {}ms",
                    self.name,
                    remaining.as_millis()
                )));
            }

            self.transition(&mut state, CircuitState::HalfOpen);
        }

        if state.status == CircuitState::HalfOpen {
            if state.trials_in_flight >= self.config.half_open_trials.max(1) {
                self.count_rejection(&mut state);
                return Err(ServiceError::circuit_open(format!(
                    "circuit '{}' is half-open and its trial calls are in flight",
                    self.name
                )));
            }
            state.trials_in_flight += 1;
        }

        Ok(CircuitPermit {
            generation: state.generation,
            trial: state.status == CircuitState::HalfOpen,
        })
    }

    /// Record a successful call
    pub fn record_success(&self, permit: CircuitPermit) {
        let mut state = self.lock();
        if self.is_stale(&state, permit, "success") {
            return;
        }
        match state.status {
            CircuitState::Closed => {
                state.window.push(true);
                self.evaluate(&mut state);
            }
            CircuitState::HalfOpen => self.transition(&mut state, CircuitState::Closed),
            CircuitState::Open => {}
        }
    }

    /// Record a call that failed with a transient remote failure
    pub fn record_failure(&self, permit: CircuitPermit) {
        let mut state = self.lock();
        if self.is_stale(&state, permit, "failure") {
            return;
        }
        match state.status {
            CircuitState::Closed => {
                state.window.push(false);
                self.evaluate(&mut state);
            }
            CircuitState::HalfOpen => self.transition(&mut state, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// Release an admitted call whose result says nothing about remote health
    /// (client errors, decode failures, cancellation)
    pub fn record_ignored(&self, permit: CircuitPermit) {
        let mut state = self.lock();
        if permit.trial && permit.generation == state.generation {
            state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
        }
    }

    /// Force the circuit back to closed with an empty window
    pub fn reset(&self) {
        let mut state = self.lock();
        self.transition(&mut state, CircuitState::Closed);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().status
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: state.status,
            samples: state.window.len(),
            failures: state.window.failures(),
            failure_ratio: state.window.failure_ratio(),
            open_for: state.opened_at.map(|at| at.elapsed()),
            trials_in_flight: state.trials_in_flight,
            rejected: state.rejected,
            generation: state.generation,
        }
    }

    /// A result from a generation that has since been left behind
    fn is_stale(&self, state: &BreakerState, permit: CircuitPermit, result: &'static str) -> bool {
        if permit.generation == state.generation {
            return false;
        }
        info!(
            circuit = %self.name,
            result,
            admitted_generation = permit.generation,
            current_generation = state.generation,
            state = %state.status,
            "Discarding result admitted under an earlier circuit generation"
        );
        increment_counter!("prediction_circuit_stale_results_total", "circuit" => self.name.clone());
        true
    }

    fn count_rejection(&self, state: &mut BreakerState) {
        state.rejected += 1;
        increment_counter!("prediction_circuit_rejections_total", "circuit" => self.name.clone());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the circuit if the closed-state window has crossed the threshold
    fn evaluate(&self, state: &mut BreakerState) {
        let required = self.config.minimum_samples.clamp(1, state.window.capacity());
        let enough_samples = state.window.len() >= required;
        if enough_samples && state.window.failure_ratio() > self.config.failure_ratio_threshold {
            warn!(
                circuit = %self.name,
                failure_ratio = state.window.failure_ratio(),
                samples = state.window.len(),
                threshold = self.config.failure_ratio_threshold,
                "Circuit OPEN: failure ratio exceeded threshold"
            );
            self.transition(state, CircuitState::Open);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.status;
        state.status = to;
        state.trials_in_flight = 0;
        state.generation += 1;
        debug!(circuit = %self.name, generation = state.generation, from = %from, to = %to, "Circuit generation advanced");

        match to {
            CircuitState::Open => {
                state.opened_at = Some(Instant::now());
                if from == CircuitState::HalfOpen {
                    warn!(circuit = %self.name, "Circuit OPEN: trial call failed, cooldown restarted");
                }
            }
            CircuitState::HalfOpen => {
                info!(circuit = %self.name, "Circuit HALF-OPEN: admitting trial calls");
            }
            CircuitState::Closed => {
                state.opened_at = None;
                state.window.clear();
                if from != CircuitState::Closed {
                    info!(circuit = %self.name, "Circuit CLOSED: service recovered");
                }
            }
        }

        if from != to {
            increment_counter!(
                "prediction_circuit_transitions_total",
                "circuit" => self.name.clone(),
                "to" => to.as_str()
            );
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub samples: usize,
    pub failures: usize,
    pub failure_ratio: f64,
    pub open_for: Option<Duration>,
    pub trials_in_flight: usize,
    /// Calls rejected locally since creation
    pub rejected: u64,
    /// Number of transitions since creation
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn breaker(config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("test", config)
    }

    fn open_breaker(cooldown: Duration) -> CircuitBreaker {
        let cb = breaker(CircuitBreakerConfig {
            window_size: 2,
            minimum_samples: 2,
            cooldown,
            half_open_trials: 1,
            ..CircuitBreakerConfig::default()
        });
        cb.record_failure(cb.check().unwrap());
        cb.record_failure(cb.check().unwrap());
        assert_eq!(cb.state(), CircuitState::Open);
        cb
    }

    #[test]
    fn test_circuit_closed_initially() {
        let cb = breaker(CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn test_six_of_ten_failures_opens() {
        let cb = breaker(CircuitBreakerConfig::default());

        for _ in 0..4 {
            cb.record_success(cb.check().unwrap());
        }
        for _ in 0..5 {
            cb.record_failure(cb.check().unwrap());
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(cb.check().unwrap());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().unwrap_err().is_circuit_open());
        assert_eq!(cb.snapshot().rejected, 1);
    }

    #[test]
    fn test_ratio_at_threshold_stays_closed() {
        let cb = breaker(CircuitBreakerConfig::default());
        for _ in 0..5 {
            cb.record_failure(cb.check().unwrap());
            cb.record_success(cb.check().unwrap());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!((cb.snapshot().failure_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_needs_minimum_samples() {
        let cb = breaker(CircuitBreakerConfig::default());
        for _ in 0..9 {
            cb.record_failure(cb.check().unwrap());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(cb.check().unwrap());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let cb = open_breaker(Duration::from_millis(50));
        assert!(cb.check().is_err());

        thread::sleep(Duration::from_millis(80));
        assert!(cb.check().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // the single trial slot is taken
        assert!(cb.check().is_err());
    }

    #[test]
    fn test_trial_success_closes_and_clears_window() {
        let cb = open_breaker(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        let trial = cb.check().unwrap();
        assert!(trial.is_trial());
        cb.record_success(trial);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.samples, 0);

        // a single failure after recovery does not reopen
        cb.record_failure(cb.check().unwrap());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_trial_failure_reopens_with_fresh_cooldown() {
        let cb = open_breaker(Duration::from_millis(40));
        thread::sleep(Duration::from_millis(60));
        let trial = cb.check().unwrap();
        cb.record_failure(trial);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());
        assert!(cb.snapshot().open_for.unwrap() < Duration::from_millis(40));
    }

    #[test]
    fn test_ignored_result_frees_trial_slot() {
        let cb = open_breaker(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        let trial = cb.check().unwrap();
        assert!(cb.check().is_err());

        cb.record_ignored(trial);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn test_reset() {
        let cb = open_breaker(Duration::from_secs(60));
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().samples, 0);
    }

    #[test]
    fn test_concurrent_failures_open_exactly_once() {
        let cb = Arc::new(breaker(CircuitBreakerConfig {
            window_size: 100,
            minimum_samples: 100,
            ..CircuitBreakerConfig::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || {
                    let permits: Vec<_> = (0..50).filter_map(|_| cb.check().ok()).collect();
                    for permit in permits {
                        cb.record_failure(permit);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        // results arriving after the transition are not counted
        assert_eq!(snapshot.samples, 100);
    }

    #[test]
    fn test_stale_failure_does_not_disturb_recovery() {
        let cb = breaker(CircuitBreakerConfig {
            window_size: 2,
            minimum_samples: 2,
            cooldown: Duration::from_millis(20),
            half_open_trials: 1,
            ..CircuitBreakerConfig::default()
        });

        // admitted while closed, finishes long after the circuit moved on
        let slow = cb.check().unwrap();
        cb.record_failure(cb.check().unwrap());
        cb.record_failure(cb.check().unwrap());
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(40));
        let trial = cb.check().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure(slow);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().trials_in_flight, 1);

        cb.record_success(trial);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_stale_success_after_recovery_is_discarded() {
        let cb = open_breaker(Duration::from_millis(10));
        let before = cb.snapshot().generation;

        thread::sleep(Duration::from_millis(30));
        let trial = cb.check().unwrap();
        cb.record_success(trial);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.snapshot().generation > before);

        // a late trial result from the finished half-open phase
        cb.record_failure(trial);
        cb.record_ignored(trial);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.samples, 0);
    }

    #[test]
    fn test_reset_invalidates_outstanding_permits() {
        let cb = breaker(CircuitBreakerConfig::default());
        let permit = cb.check().unwrap();
        cb.reset();
        cb.record_failure(permit);
        assert_eq!(cb.snapshot().samples, 0);
    }
}

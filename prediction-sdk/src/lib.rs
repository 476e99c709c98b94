//! # Prediction SDK
//!
//! A resilient client for the external ML prediction service used by the
//! Phoenix ORCH project.
//!
//! This crate provides:
//!
//! - A typed client for passing-chance, passing-mark and clustering
//!   predictions, plus the fire-and-forget trigger
//! - Classification of remote responses into retryable and terminal failures
//! - Resilience patterns (retries with backoff, ratio-based circuit breakers)
//! - Normalization of the legacy and current clustering schemas
//! - Fallback values so callers always receive a well-formed result
//! - Configuration management and logging utilities
//!
//! ## Architecture
//!
//! - `PredictionClient`: the facade the rest of the application calls
//! - `Transport`: performs one HTTP attempt and returns the raw response
//! - `Resilience`: circuit breaker admission around a retry executor
//! - `ServiceError`: error taxonomy with diagnostic context
//!
//! ```no_run
//! use prediction_sdk::{PassingChanceRequest, PredictionClient};
//!
//! # async fn run() -> prediction_sdk::Result<()> {
//! let client = PredictionClient::from_env()?;
//! let request = PassingChanceRequest::new().subject("Algebra", vec![0.8, 0.4, 0.9]);
//! let chance = client.passing_chance(&request).await;
//! if chance.is_fallback() {
//!     println!("no predictions available right now");
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core modules
pub mod core;
pub use self::core::{ClientBuilder, ServiceClient, Transport};

// Re-export the prediction client
pub mod services;
pub use services::prediction::{
    ClusteringMethod, ClusteringOutcome, ClusteringRecommendation, ClusteringRequest, FallbackCause,
    OperationKind, PassingChance, PassingChanceRequest, PassingMark, PassingMarkRequest, Prediction,
    PredictionClient, Recommendation, StudyProgramId, SubjectChance,
};

// Re-export error handling
pub mod error;
pub use error::{ErrorContext, Result, ServiceError};

// Re-export resilience patterns
pub mod resilience;
pub use resilience::{CancellationHandle, CancellationSignal, CircuitBreaker, CircuitState, Resilience, RetryExecutor};

// Re-export configuration management
pub mod config;
pub use config::{ConfigProvider, PredictionServiceConfig, ServiceConfig};

pub mod logging;

// Utility module for common functionality
mod util;

#[cfg(test)]
mod tests;

/// Create a new default client builder
pub fn client() -> ClientBuilder {
    ClientBuilder::new()
}

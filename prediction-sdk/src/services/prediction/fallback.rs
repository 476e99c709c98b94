//! Fallback provider
//!
//! Supplies the degraded value for an operation whose remote call could not
//! succeed, and reports why. Every fallback is logged at `warn` and counted.

use metrics::increment_counter;
use tracing::warn;

use super::models::{ClusteringOutcome, FallbackCause, OperationKind, PassingChance, PassingMark};
use crate::error::ServiceError;

/// A canonical result type with a structurally valid degraded value
pub trait Fallback: Sized {
    fn fallback(cause: FallbackCause) -> Self;
}

/// No predictions available
impl Fallback for PassingChance {
    fn fallback(_cause: FallbackCause) -> Self {
        PassingChance::default()
    }
}

/// Empty distribution, no chosen grade
impl Fallback for PassingMark {
    fn fallback(_cause: FallbackCause) -> Self {
        PassingMark::default()
    }
}

impl Fallback for ClusteringOutcome {
    fn fallback(cause: FallbackCause) -> Self {
        ClusteringOutcome::Unavailable { cause }
    }
}

/// Trigger: nothing to return, the failure is only logged
impl Fallback for () {
    fn fallback(_cause: FallbackCause) -> Self {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackProvider;

impl FallbackProvider {
    pub fn new() -> Self {
        Self
    }

    /// Degraded value for `operation` after `error`, with the cause it was served for
    pub fn fallback_for<T: Fallback>(&self, operation: OperationKind, error: &ServiceError) -> (T, FallbackCause) {
        let cause = FallbackCause::from_error(error);
        let request_id = error.request_id().unwrap_or("-");

        if cause == FallbackCause::CircuitOpen {
            warn!(
                operation = operation.as_str(),
                request_id,
                "circuit open, short-circuiting to fallback"
            );
        } else {
            warn!(
                operation = operation.as_str(),
                request_id,
                cause = cause.as_str(),
                kind = error.kind(),
                status = ?error.status_code(),
                error = %error,
                "prediction call failed, serving fallback"
            );
        }

        increment_counter!(
            "prediction_fallbacks_total",
            "operation" => operation.as_str(),
            "cause" => cause.as_str()
        );

        (T::fallback(cause), cause)
    }
}

//! Prediction service client
//!
//! [`PredictionClient`] is the only surface the rest of the application
//! calls. Each operation runs through its circuit breaker and retry policy,
//! classifies every attempt, normalizes a successful answer, and falls back
//! to a degraded value when the call cannot succeed. No operation returns a
//! transport or decoding error to its caller.

mod fallback;
mod models;
mod normalize;

pub use fallback::{Fallback, FallbackProvider};
pub use models::*;
pub use normalize::Normalize;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::increment_counter;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PredictionServiceConfig;
use crate::core::{ClientBuilder, OutboundRequest, ServiceClient, Transport};
use crate::error::{classify, CallOutcome, DecodedPayload, Result, ServiceError};
use crate::resilience::{CancellationSignal, CircuitBreaker, CircuitSnapshot, CircuitState, Resilience, RetryConfig};
use crate::util::generate_request_id;

/// One resilience guard per operation
#[derive(Debug, Clone)]
struct OperationGuards {
    passing_chance: Resilience,
    passing_mark: Resilience,
    clustering: Resilience,
    trigger: Resilience,
}

impl OperationGuards {
    fn get(&self, operation: OperationKind) -> &Resilience {
        match operation {
            OperationKind::PassingChance => &self.passing_chance,
            OperationKind::PassingMark => &self.passing_mark,
            OperationKind::Clustering => &self.clustering,
            OperationKind::Trigger => &self.trigger,
        }
    }
}

/// Resilient client for the external prediction service
#[derive(Clone)]
pub struct PredictionClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    timeout: Duration,
    guards: OperationGuards,
    fallback: FallbackProvider,
}

impl std::fmt::Debug for PredictionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("guards", &self.guards)
            .finish()
    }
}

impl PredictionClient {
    /// Assemble a client; `breaker_for` supplies the breaker guarding each operation
    pub(crate) fn assemble(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        timeout: Duration,
        retry_config: RetryConfig,
        breaker_for: impl Fn(OperationKind) -> Arc<CircuitBreaker>,
    ) -> Self {
        let guard = |operation| Resilience::new(retry_config.clone(), breaker_for(operation));

        Self {
            transport,
            base_url: base_url.into(),
            timeout,
            guards: OperationGuards {
                passing_chance: guard(OperationKind::PassingChance),
                passing_mark: guard(OperationKind::PassingMark),
                clustering: guard(OperationKind::Clustering),
                trigger: guard(OperationKind::Trigger),
            },
            fallback: FallbackProvider::new(),
        }
    }

    /// Create a new builder for the prediction client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client configured from `ML_SERVICE_*` environment variables
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_config(&PredictionServiceConfig::from_env()).build()
    }

    /// Chance of passing each subject; empty when no predictions are available
    pub async fn passing_chance(&self, request: &PassingChanceRequest) -> Prediction<PassingChance> {
        self.passing_chance_with_cancel(request, &CancellationSignal::none()).await
    }

    pub async fn passing_chance_with_cancel(
        &self,
        request: &PassingChanceRequest,
        cancel: &CancellationSignal,
    ) -> Prediction<PassingChance> {
        let operation = OperationKind::PassingChance;
        let result = self.call::<ChanceWire, _>(operation, Some(request), cancel).await;
        self.degrade(operation, result)
    }

    /// Predicted grade distribution for one subject
    pub async fn passing_mark(&self, request: &PassingMarkRequest) -> Prediction<PassingMark> {
        self.passing_mark_with_cancel(request, &CancellationSignal::none()).await
    }

    pub async fn passing_mark_with_cancel(
        &self,
        request: &PassingMarkRequest,
        cancel: &CancellationSignal,
    ) -> Prediction<PassingMark> {
        let operation = OperationKind::PassingMark;
        let result = self.call::<MarkWire, _>(operation, Some(request), cancel).await;
        self.degrade(operation, result)
    }

    /// Subjects similar to the requested ones
    pub async fn clustering(&self, request: &ClusteringRequest) -> ClusteringOutcome {
        self.clustering_with_cancel(request, &CancellationSignal::none()).await
    }

    pub async fn clustering_with_cancel(
        &self,
        request: &ClusteringRequest,
        cancel: &CancellationSignal,
    ) -> ClusteringOutcome {
        let operation = OperationKind::Clustering;
        let result = self
            .call::<ClusteringWire, _>(operation, Some(request), cancel)
            .await
            .map(ClusteringOutcome::from_answer);
        self.degrade(operation, result).into_inner()
    }

    /// Ask the service to recompute its predictions. Failures are logged only.
    pub async fn trigger_prediction(&self) {
        self.trigger_prediction_with_cancel(&CancellationSignal::none()).await
    }

    pub async fn trigger_prediction_with_cancel(&self, cancel: &CancellationSignal) {
        let operation = OperationKind::Trigger;
        let result = self.call::<Acknowledgement, ()>(operation, None, cancel).await;
        self.degrade(operation, result);
    }

    /// Breaker guarding `operation`
    pub fn circuit_breaker(&self, operation: OperationKind) -> &Arc<CircuitBreaker> {
        self.guards.get(operation).circuit_breaker()
    }

    pub fn circuit_state(&self, operation: OperationKind) -> CircuitState {
        self.guards.get(operation).circuit_state()
    }

    /// Snapshot of every distinct breaker; a shared breaker is reported once
    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.distinct_breakers().iter().map(|b| b.snapshot()).collect()
    }

    /// Force every breaker back to Closed
    pub fn reset_circuits(&self) {
        for breaker in self.distinct_breakers() {
            breaker.reset();
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.guards.passing_chance.retry_config()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn distinct_breakers(&self) -> Vec<&Arc<CircuitBreaker>> {
        let mut breakers: Vec<&Arc<CircuitBreaker>> = Vec::new();
        for operation in OperationKind::ALL {
            let breaker = self.circuit_breaker(operation);
            if !breakers.iter().any(|known| Arc::ptr_eq(known, breaker)) {
                breakers.push(breaker);
            }
        }
        breakers
    }

    /// One logical call: breaker, retries, classification, normalization
    async fn call<W, R>(
        &self,
        operation: OperationKind,
        request: Option<&R>,
        cancel: &CancellationSignal,
    ) -> Result<W::Canonical>
    where
        W: DecodedPayload + Normalize,
        R: Serialize + ?Sized,
    {
        let request_id = generate_request_id();
        increment_counter!("prediction_calls_total", "operation" => operation.as_str());

        let body = request
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| {
                ServiceError::validation(format!("Request could not be encoded: {}", e))
                    .for_call(operation.path(), &request_id)
            })?;
        let outbound = OutboundRequest::post(operation.path(), body);

        let outbound = &outbound;
        let id = request_id.as_str();
        let outcome = self
            .guards
            .get(operation)
            .execute(cancel, move |attempt| self.attempt::<W>(operation, outbound, attempt, id))
            .await;

        match outcome {
            CallOutcome::Success(payload) => {
                debug!(operation = operation.as_str(), request_id = %request_id, "prediction call succeeded");
                Ok(payload.normalize())
            }
            CallOutcome::RetryableFailure(err) | CallOutcome::TerminalFailure(err) => {
                Err(err.for_call(operation.path(), &request_id))
            }
        }
    }

    /// A single timed attempt, classified
    async fn attempt<W: DecodedPayload>(
        &self,
        operation: OperationKind,
        request: &OutboundRequest,
        attempt: u32,
        request_id: &str,
    ) -> CallOutcome<W> {
        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => classify::<W>(&response),
            Ok(Err(err)) => CallOutcome::from_error(err),
            Err(_) => CallOutcome::RetryableFailure(ServiceError::timeout(format!(
                "No response within {:?}",
                self.timeout
            ))),
        };

        if let CallOutcome::RetryableFailure(err) | CallOutcome::TerminalFailure(err) = &outcome {
            let context = err.context();
            warn!(
                operation = operation.as_str(),
                request_id,
                attempt,
                kind = err.kind(),
                status = ?err.status_code(),
                body = context.and_then(|c| c.get("body")).unwrap_or(""),
                headers = context.and_then(|c| c.get("headers")).unwrap_or(""),
                "prediction attempt failed: {}",
                err
            );
        }
        outcome
    }

    fn degrade<T: Fallback>(&self, operation: OperationKind, result: Result<T>) -> Prediction<T> {
        match result {
            Ok(value) => Prediction::Live(value),
            Err(err) => {
                let (value, cause) = self.fallback.fallback_for(operation, &err);
                Prediction::Fallback { value, cause }
            }
        }
    }
}

#[async_trait]
impl ServiceClient for PredictionClient {
    fn name(&self) -> &str {
        "prediction-service"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn health_check(&self) -> Result<bool> {
        let probe = OutboundRequest::get(HEALTH_PATH);
        match tokio::time::timeout(self.timeout, self.transport.send(&probe)).await {
            Ok(Ok(response)) if (200..300).contains(&response.status) => Ok(true),
            Ok(Ok(response)) => {
                warn!(status = response.status, body = %response.body.diagnostic(), "Prediction service health check failed");
                Ok(false)
            }
            Ok(Err(e)) => {
                warn!("Prediction service health check failed: {}", e);
                Ok(false)
            }
            Err(_) => {
                warn!("Prediction service health check timed out after {:?}", self.timeout);
                Ok(false)
            }
        }
    }
}

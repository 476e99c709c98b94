//! Client builder implementation
//!
//! Builds the HTTP client, the per-operation circuit breakers and the
//! [`PredictionClient`] on top of them.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;

use crate::config::{PredictionServiceConfig, DEFAULT_BASE_URL};
use crate::core::Transport;
use crate::error::{Result, ServiceError};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
use crate::services::prediction::{OperationKind, PredictionClient};
use crate::services::{HttpTransport, UserAgent};

/// Header carrying the service API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Builder for [`PredictionClient`]
pub struct ClientBuilder {
    /// Base URL for the service
    base_url: String,

    /// API key; the header is omitted when empty
    api_key: Option<String>,

    /// Custom headers to include with all requests
    custom_headers: HashMap<String, String>,

    /// Per-attempt timeout
    timeout: Duration,

    retry_config: RetryConfig,

    /// Configuration of each per-operation breaker
    circuit_breaker_config: CircuitBreakerConfig,

    /// One breaker shared by every operation, instead of one each
    shared_breaker: Option<Arc<CircuitBreaker>>,

    user_agent: UserAgent,

    /// Enable response compression
    compression: bool,

    /// Replaces the HTTP transport (tests, alternative stacks)
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            custom_headers: HashMap::new(),
            timeout: Duration::from_millis(5000),
            retry_config: RetryConfig::default(),
            circuit_breaker_config: CircuitBreakerConfig::default(),
            shared_breaker: None,
            user_agent: UserAgent::default(),
            compression: true,
            transport: None,
        }
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded from a service configuration
    pub fn from_config(config: &PredictionServiceConfig) -> Self {
        let builder = Self::new()
            .base_url(config.base_url.clone())
            .timeout(config.timeout)
            .retry_config(config.retry_config())
            .circuit_breaker(config.circuit_breaker_config());

        match &config.api_key {
            Some(key) => builder.api_key(key.clone()),
            None => builder,
        }
    }

    /// Set the base URL for the service
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Add a custom header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Configure the per-operation circuit breakers
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker_config = config;
        self
    }

    /// Guard every operation with the same breaker
    pub fn shared_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.shared_breaker = Some(breaker);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build an HTTP client with the configured settings
    pub fn build_http_client(&self) -> Result<ReqwestClient> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.custom_headers {
            let header_name = HeaderName::from_str(key)
                .map_err(|e| ServiceError::configuration(format!("Invalid header name: {}", e)))?;

            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ServiceError::configuration(format!("Invalid header value: {}", e)))?;

            headers.insert(header_name, header_value);
        }

        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| ServiceError::configuration(format!("Invalid API key header: {}", e)))?;
            value.set_sensitive(true);
            let name = HeaderName::from_str(API_KEY_HEADER)
                .map_err(|e| ServiceError::configuration(format!("Invalid header name: {}", e)))?;
            headers.insert(name, value);
        }

        ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.to_string())
            .gzip(self.compression)
            .default_headers(headers)
            .build()
            .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
    }

    /// Build the prediction client
    pub fn build(self) -> Result<PredictionClient> {
        if self.timeout.is_zero() {
            return Err(ServiceError::configuration("timeout must be greater than zero"));
        }
        if self.retry_config.max_attempts == 0 {
            return Err(ServiceError::configuration("max_attempts must be at least 1"));
        }

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new(self.build_http_client()?, self.base_url.clone())?),
        };

        let shared = self.shared_breaker.clone();
        let config = self.circuit_breaker_config.clone();
        let breaker_for = move |operation: OperationKind| match &shared {
            Some(breaker) => Arc::clone(breaker),
            None => Arc::new(CircuitBreaker::new(operation.as_str(), config.clone())),
        };

        Ok(PredictionClient::assemble(
            transport,
            self.base_url.trim_end_matches('/'),
            self.timeout,
            self.retry_config,
            breaker_for,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakers_are_per_operation_by_default() {
        let client = ClientBuilder::new().build().unwrap();
        let chance = client.circuit_breaker(OperationKind::PassingChance);
        let mark = client.circuit_breaker(OperationKind::PassingMark);

        assert!(!Arc::ptr_eq(chance, mark));
        assert_eq!(chance.name(), "passing_chance");
        assert_eq!(client.circuit_snapshots().len(), 4);
    }

    #[test]
    fn test_shared_breaker_is_injected() {
        let shared = Arc::new(CircuitBreaker::new("ml-service", CircuitBreakerConfig::default()));
        let client = ClientBuilder::new()
            .shared_circuit_breaker(Arc::clone(&shared))
            .build()
            .unwrap();

        for operation in OperationKind::ALL {
            assert!(Arc::ptr_eq(client.circuit_breaker(operation), &shared));
        }
        assert_eq!(client.circuit_snapshots().len(), 1);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(ClientBuilder::new().base_url("not a url").build().is_err());
        assert!(ClientBuilder::new().timeout(Duration::ZERO).build().is_err());
        assert!(ClientBuilder::new()
            .header("bad header", "x")
            .build_http_client()
            .is_err());
    }

    #[test]
    fn test_blank_api_key_is_not_sent() {
        assert!(ClientBuilder::new().api_key("   ").build_http_client().is_ok());
        assert!(ClientBuilder::new().api_key("secret").build_http_client().is_ok());
    }
}

//! Error handling for the prediction SDK
//!
//! This module provides the error taxonomy used across the client:
//! - Transient remote failures (network, timeout, 5xx) that are worth retrying
//! - Client/request failures (4xx) and decode failures that are terminal
//! - Local policy outcomes (circuit open, cancellation) that never reached the remote
//!
//! Every error can carry an [`ErrorContext`] with the diagnostics captured
//! at the point of failure.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod mapping;

pub use mapping::{classify, CallOutcome, DecodedPayload, RawResponse, ResponseBody};

/// Result type for prediction SDK operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Main error type for the prediction SDK
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Connection-level failures
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt did not complete within its timeout
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The remote answered with a 5xx status
    #[error("Server error: {0}")]
    Server(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other 4xx, or a request that could not be built
    #[error("Validation error: {0}")]
    Validation(String),

    /// A success status whose body could not be decoded
    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller cancelled the call or its deadline passed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The circuit breaker rejected the call locally
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        ServiceError::Server(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ServiceError::Authorization(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        ServiceError::Cancelled(message.into())
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        ServiceError::CircuitOpen(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        match self {
            ServiceError::WithContext { inner, mut context } => {
                context.add(key, value);
                ServiceError::WithContext { inner, context }
            }
            other => {
                let mut context = ErrorContext::new();
                context.add(key, value);
                other.with_context(context)
            }
        }
    }

    /// Tag the error with the logical call it belongs to
    pub fn for_call(self, endpoint: &str, request_id: &str) -> Self {
        match self {
            ServiceError::WithContext { inner, mut context } => {
                context.endpoint.get_or_insert_with(|| endpoint.to_string());
                context.request_id = Some(request_id.to_string());
                ServiceError::WithContext { inner, context }
            }
            other => other.with_context(ErrorContext::new().endpoint(endpoint).request_id(request_id)),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }

    /// The error with all context layers peeled off
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// The outermost context, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ServiceError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::WithContext { inner, context } => {
                context.status_code.or_else(|| inner.status_code())
            }
            _ => None,
        }
    }

    /// Transient remote failures: worth another attempt and counted by the breaker
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            ServiceError::Network(_) | ServiceError::Timeout(_) | ServiceError::Server(_)
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self.root(), ServiceError::CircuitOpen(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), ServiceError::Cancelled(_))
    }

    /// Short category label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self.root() {
            ServiceError::Network(_) => "network",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Server(_) => "server",
            ServiceError::Authentication(_) => "authentication",
            ServiceError::Authorization(_) => "authorization",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Validation(_) => "validation",
            ServiceError::Parsing(_) => "parsing",
            ServiceError::Configuration(_) => "configuration",
            ServiceError::Cancelled(_) => "cancelled",
            ServiceError::CircuitOpen(_) => "circuit_open",
            ServiceError::Internal(_) => "internal",
            ServiceError::WithContext { .. } => "unknown",
        }
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Service that generated the error
    pub service: String,

    /// When the failure was observed
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Remote error code (e.g. `MODEL_NOT_LOADED`)
    pub error_code: Option<String>,

    /// Request ID of the logical call
    pub request_id: Option<String>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    /// Additional context data (truncated body, sanitized headers, attempts)
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "prediction-service".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            error_code: None,
            request_id: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Convert reqwest errors to ServiceError
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let service_error = if err.is_timeout() {
            ServiceError::timeout(format!("Request timed out: {}", err))
        } else if err.is_builder() {
            ServiceError::validation(format!("Invalid request: {}", err))
        } else if err.is_decode() {
            ServiceError::parsing(format!("Response decode error: {}", err))
        } else if err.is_connect() {
            ServiceError::network(format!("Connection error: {}", err))
        } else if err.is_request() || err.is_body() || err.is_redirect() {
            ServiceError::network(format!("Transport error: {}", err))
        } else {
            ServiceError::internal(format!("HTTP client error: {}", err))
        };

        match err.status() {
            Some(status) => {
                service_error.with_context(ErrorContext::for_service("http_client").status_code(status.as_u16()))
            }
            None => service_error,
        }
    }
}

/// Convert serde_json errors to ServiceError
impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
    }
}

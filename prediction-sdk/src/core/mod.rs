//! Core abstractions for the prediction SDK
//!
//! - `Transport`: performs one HTTP attempt and hands back the raw response
//! - `ServiceClient`: identity and health of a remote service client
//! - `ClientBuilder`: builder for the prediction client

pub mod builder;
pub use builder::ClientBuilder;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RawResponse, Result};

/// Base trait for remote service clients
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// The client name/identifier
    fn name(&self) -> &str;

    /// The base URL for the service
    fn base_url(&self) -> &str;

    /// Single connectivity probe; `Ok(false)` when the service is unreachable
    async fn health_check(&self) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// One request to the remote service, relative to its base URL
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub path: &'static str,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            body: None,
        }
    }

    pub fn post(path: &'static str, body: Option<Value>) -> Self {
        Self {
            method: HttpMethod::Post,
            path,
            body,
        }
    }
}

/// Performs a single attempt against the remote service.
///
/// Implementations return `Err` only when no HTTP response was obtained
/// (connection refused, reset, timeout); any status code is returned as a
/// [`RawResponse`] for the classifier to judge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse>;
}

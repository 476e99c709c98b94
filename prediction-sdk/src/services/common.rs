//! Common utilities for service clients
//!
//! User agent formatting and the reqwest-backed [`Transport`].

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::{HttpMethod, OutboundRequest, Transport};
use crate::error::{RawResponse, ResponseBody, Result, ServiceError};

/// UserAgent structure for identifying the client to upstream services
#[derive(Debug, Clone)]
pub struct UserAgent {
    pub app_name: String,
    pub version: String,
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "Phoenix-ORCH".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Some("prediction-sdk".to_string()),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;

        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

/// Transport over a configured reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| ServiceError::configuration(format!("Invalid base URL {}: {}", base_url, e)))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse> {
        let url = self.endpoint(request.path);
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await?;
        Ok(read_response(response).await)
    }
}

/// Capture status, headers and body; a body that cannot be read is marked, not raised
async fn read_response(response: reqwest::Response) -> RawResponse {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<non-ascii>").to_string(),
            )
        })
        .collect();

    let body = match response.text().await {
        Ok(text) => ResponseBody::Text(text),
        Err(e) => ResponseBody::Unreadable(e.to_string()),
    };

    RawResponse { status, headers, body }
}

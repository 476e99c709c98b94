//! Response classification
//!
//! Maps a raw prediction-service response onto a [`CallOutcome`]. The mapping
//! is a pure function of status and body: 5xx is retryable, every other
//! non-success status is terminal, and a success whose body does not decode
//! is terminal too. A success whose body could not be read at all (the
//! connection dropped or stalled mid-body) is a transport failure and is
//! retryable. Failed outcomes carry the diagnostics captured from the
//! response (status, sanitized headers, truncated body) in their context.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ErrorContext, Result, ServiceError};
use crate::util::{sanitize_for_logging, sanitize_header, truncate_chars};

/// Maximum number of body characters kept for diagnostics
pub const DIAGNOSTIC_BODY_LIMIT: usize = 500;

/// Body of a response as seen by the classifier
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    /// Reading the body failed; holds the reason
    Unreadable(String),
}

impl ResponseBody {
    /// Bounded rendering used in logs and error context
    pub fn diagnostic(&self) -> String {
        match self {
            ResponseBody::Text(text) => sanitize_for_logging(&truncate_chars(text, DIAGNOSTIC_BODY_LIMIT)),
            ResponseBody::Unreadable(reason) => format!("<unreadable body: {}>", reason),
        }
    }
}

/// Status, headers and body of one attempt
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Text(body.into()),
        }
    }

    pub fn unreadable(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Unreadable(reason.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Snapshot of the response for an error context
    pub fn diagnostics(&self) -> ErrorContext {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, sanitize_header(name, value)))
            .collect::<Vec<_>>()
            .join("; ");

        let mut context = ErrorContext::new()
            .status_code(self.status)
            .with("body", self.body.diagnostic())
            .with("headers", headers);

        if let Some(code) = self.remote_field("code") {
            context = context.error_code(code);
        }
        context
    }

    /// A string field of a JSON object body, if there is one
    fn remote_field(&self, field: &str) -> Option<String> {
        match &self.body {
            ResponseBody::Text(text) => serde_json::from_str::<Value>(text)
                .ok()?
                .get(field)?
                .as_str()
                .map(str::to_string),
            ResponseBody::Unreadable(_) => None,
        }
    }

    /// Human readable failure message taken from the body or the status line
    fn failure_message(&self) -> String {
        if let Some(message) = self.remote_field("message").or_else(|| self.remote_field("error")) {
            return truncate_chars(&message, DIAGNOSTIC_BODY_LIMIT);
        }

        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unexpected status");

        match &self.body {
            ResponseBody::Text(text) if !text.trim().is_empty() => {
                format!("{} {}: {}", self.status, reason, self.body.diagnostic())
            }
            ResponseBody::Text(_) => format!("{} {}", self.status, reason),
            ResponseBody::Unreadable(_) => format!("{} {}: {}", self.status, reason, self.body.diagnostic()),
        }
    }
}

/// Outcome of a single attempt, or of a whole logical call
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    RetryableFailure(ServiceError),
    TerminalFailure(ServiceError),
}

/// Tag of a [`CallOutcome`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Retryable,
    Terminal,
}

impl<T> CallOutcome<T> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CallOutcome::Success(_) => OutcomeKind::Success,
            CallOutcome::RetryableFailure(_) => OutcomeKind::Retryable,
            CallOutcome::TerminalFailure(_) => OutcomeKind::Terminal,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Sort an error into the matching failure variant
    pub fn from_error(err: ServiceError) -> Self {
        if err.is_retryable() {
            CallOutcome::RetryableFailure(err)
        } else {
            CallOutcome::TerminalFailure(err)
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Success(value) => CallOutcome::Success(f(value)),
            CallOutcome::RetryableFailure(err) => CallOutcome::RetryableFailure(err),
            CallOutcome::TerminalFailure(err) => CallOutcome::TerminalFailure(err),
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::RetryableFailure(err) | CallOutcome::TerminalFailure(err) => Err(err),
        }
    }
}

/// A payload type the classifier can decode from a success body
pub trait DecodedPayload: Sized {
    /// Decode the body, rejecting payloads that miss required fields
    fn decode(body: &str) -> Result<Self>;
}

/// Permissive JSON decoding shared by the payload types
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(ServiceError::from)
}

/// Classify one response. Pure: the same response always yields the same tag.
pub fn classify<T: DecodedPayload>(response: &RawResponse) -> CallOutcome<T> {
    match response.status {
        200..=299 => match &response.body {
            ResponseBody::Text(body) => match T::decode(body) {
                Ok(payload) => CallOutcome::Success(payload),
                Err(err) => CallOutcome::TerminalFailure(err.with_context(response.diagnostics())),
            },
            ResponseBody::Unreadable(reason) => CallOutcome::RetryableFailure(
                ServiceError::network(format!("Response body read failed: {}", reason))
                    .with_context(response.diagnostics()),
            ),
        },
        500..=599 => CallOutcome::RetryableFailure(
            ServiceError::server(response.failure_message()).with_context(response.diagnostics()),
        ),
        status => CallOutcome::TerminalFailure(
            client_error(status, response.failure_message()).with_context(response.diagnostics()),
        ),
    }
}

/// Map a non-success, non-5xx status to a terminal error
fn client_error(status: u16, message: String) -> ServiceError {
    match status {
        401 => ServiceError::authentication(message),
        403 => ServiceError::authorization(message),
        404 => ServiceError::not_found(message),
        _ => ServiceError::validation(message),
    }
}

/// Determine if an HTTP status code indicates a retryable failure
pub fn is_retryable_status(status: u16) -> bool {
    (500..=599).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Echo {
        value: Option<i64>,
    }

    impl DecodedPayload for Echo {
        fn decode(body: &str) -> Result<Self> {
            decode_json(body)
        }
    }

    #[test]
    fn test_every_5xx_is_retryable() {
        for status in 500..=599 {
            for body in ["", "oops", r#"{"code":"MODEL_NOT_LOADED","message":"warming up"}"#] {
                let outcome = classify::<Echo>(&RawResponse::new(status, body));
                assert_eq!(outcome.kind(), OutcomeKind::Retryable, "status {}", status);
            }
        }
    }

    #[test]
    fn test_every_4xx_is_terminal() {
        for status in 400..=499 {
            let outcome = classify::<Echo>(&RawResponse::new(status, r#"{"error":"bad"}"#));
            assert_eq!(outcome.kind(), OutcomeKind::Terminal, "status {}", status);
        }
    }

    #[test]
    fn test_success_decodes_payload() {
        match classify::<Echo>(&RawResponse::new(200, r#"{"value": 7}"#)) {
            CallOutcome::Success(echo) => assert_eq!(echo.value, Some(7)),
            other => panic!("unexpected outcome: {:?}", other.kind()),
        }
    }

    #[test]
    fn test_undecodable_success_is_terminal_parsing() {
        let outcome = classify::<Echo>(&RawResponse::new(200, "<html>proxy page</html>"));
        match outcome {
            CallOutcome::TerminalFailure(err) => assert_eq!(err.kind(), "parsing"),
            other => panic!("unexpected outcome: {:?}", other.kind()),
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        let response = RawResponse::new(503, "Service Unavailable");
        let first = classify::<Echo>(&response).kind();
        let second = classify::<Echo>(&response).kind();
        assert_eq!(first, second);
    }

    #[test]
    fn test_diagnostics_truncate_body() {
        let body = "x".repeat(2_000);
        let outcome = classify::<Echo>(&RawResponse::new(502, body));
        let err = match outcome {
            CallOutcome::RetryableFailure(err) => err,
            other => panic!("unexpected outcome: {:?}", other.kind()),
        };
        let captured = err.context().and_then(|c| c.get("body")).map(str::to_string).unwrap_or_default();
        assert_eq!(captured.chars().count(), DIAGNOSTIC_BODY_LIMIT + 3);
        assert!(captured.ends_with("..."));
        assert_eq!(err.status_code(), Some(502));
    }

    #[test]
    fn test_unreadable_body_is_marked_not_raised() {
        let outcome = classify::<Echo>(&RawResponse::unreadable(500, "connection reset"));
        let err = match outcome {
            CallOutcome::RetryableFailure(err) => err,
            other => panic!("unexpected outcome: {:?}", other.kind()),
        };
        assert_eq!(
            err.context().and_then(|c| c.get("body")),
            Some("<unreadable body: connection reset>")
        );
    }

    #[test]
    fn test_success_with_dropped_body_is_retryable() {
        let outcome = classify::<Echo>(&RawResponse::unreadable(200, "connection reset by peer"));
        let err = match outcome {
            CallOutcome::RetryableFailure(err) => err,
            other => panic!("unexpected outcome: {:?}", other.kind()),
        };
        assert_eq!(err.kind(), "network");
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), Some(200));
        assert_eq!(
            err.context().and_then(|c| c.get("body")),
            Some("<unreadable body: connection reset by peer>")
        );
    }

    #[test]
    fn test_client_error_with_dropped_body_stays_terminal() {
        let outcome = classify::<Echo>(&RawResponse::unreadable(422, "connection reset"));
        assert!(matches!(outcome, CallOutcome::TerminalFailure(_)));
    }

    #[test]
    fn test_remote_error_body_is_surfaced() {
        let response = RawResponse::new(503, r#"{"code":"MODEL_NOT_LOADED","message":"model warming up"}"#)
            .with_header("X-API-Key", "top-secret");
        let err = classify::<Echo>(&response).into_result().unwrap_err();
        let context = err.context().cloned().unwrap_or_default();

        assert_eq!(err.to_string(), "Server error: model warming up");
        assert_eq!(context.error_code.as_deref(), Some("MODEL_NOT_LOADED"));
        assert!(!context.get("headers").unwrap_or_default().contains("top-secret"));
    }

    #[test]
    fn test_client_error_mapping() {
        let kind = |status| classify::<Echo>(&RawResponse::new(status, "")).into_result().unwrap_err().kind();
        assert_eq!(kind(401), "authentication");
        assert_eq!(kind(403), "authorization");
        assert_eq!(kind(404), "not_found");
        assert_eq!(kind(422), "validation");
        assert_eq!(kind(302), "validation");
    }

    #[test]
    fn test_is_retryable_status() {
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(429));
    }
}

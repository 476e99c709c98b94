//! Utility module for common functionality
//!
//! Small helpers shared by the classifier, the transport and the config layer.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

/// Patterns that must never reach a log line or an error context.
static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)bearer\s+[A-Za-z0-9\-_\.=]+", "Bearer [REDACTED]"),
        (r"(?i)x-api-key\s*[=:]\s*[^\s,;&]+", "x-api-key=[REDACTED]"),
        (r"(?i)api[_-]?key\s*[=:]\s*[^\s,;&]+", "api_key=[REDACTED]"),
        (r"(?i)password\s*[=:]\s*[^\s,;&]+", "password=[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Header names whose values are always replaced when captured.
const REDACTED_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Keep at most `max_chars` characters of `s`, appending `...` when something was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

/// Sanitize a string for logging (remove sensitive data patterns)
pub fn sanitize_for_logging(s: &str) -> String {
    let mut result = s.to_string();
    for (re, replacement) in SENSITIVE_PATTERNS.iter() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Render a header pair for diagnostics, hiding credentials.
pub fn sanitize_header(name: &str, value: &str) -> String {
    if REDACTED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
        "[REDACTED]".to_string()
    } else {
        sanitize_for_logging(value)
    }
}

/// Generate a unique request ID
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse a duration from a string (e.g. "250ms", "30s", "5m", "1h").
///
/// A bare number is read as milliseconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("hi", 2), "hi");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "ľščťž".repeat(200);
        let truncated = truncate_chars(&body, 500);
        assert_eq!(truncated.chars().count(), 503);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("5000"), Some(Duration::from_millis(5000)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_sanitize_for_logging() {
        let output = sanitize_for_logging("Authorization: Bearer abc123xyz");
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("abc123xyz"));

        let output = sanitize_for_logging("api_key=secret-value&x=1");
        assert!(!output.contains("secret-value"));
    }

    #[test]
    fn test_sanitize_header() {
        assert_eq!(sanitize_header("X-API-Key", "s3cr3t"), "[REDACTED]");
        assert_eq!(sanitize_header("content-type", "application/json"), "application/json");
    }
}

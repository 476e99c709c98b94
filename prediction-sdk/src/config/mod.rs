//! Configuration management for the prediction client
//!
//! Values are read through a [`ConfigProvider`], normally the environment.
//! Every setting has a safe default: a missing key silently uses it, an
//! unusable value is logged and replaced by it, so an unconfigured client
//! still starts and degrades gracefully.

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ServiceError};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::util::parse_duration;

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| ServiceError::configuration(format!("Invalid integer for key {}: {}", key, e)))
    }

    fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|e| ServiceError::configuration(format!("Invalid float for key {}: {}", key, e)))
    }

    fn get_duration(&self, key: &str) -> Result<Duration> {
        let value = self.get_string(key)?;
        parse_duration(&value)
            .ok_or_else(|| ServiceError::configuration(format!("Invalid duration for key {}: {}", key, value)))
    }

    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Optional value: absent and blank both read as `None`
    fn get_optional(&self, key: &str) -> Option<String> {
        self.get_string(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// Read with `read`, falling back to `default` when absent, unparseable or rejected by `accept`
    fn get_checked_or<T, R, A>(&self, key: &str, default: T, read: R, accept: A) -> T
    where
        T: Debug,
        R: Fn(&Self, &str) -> Result<T>,
        A: Fn(&T) -> bool,
    {
        if self.get_string(key).is_err() {
            return default;
        }
        match read(self, key) {
            Ok(value) if accept(&value) => value,
            Ok(value) => {
                warn!(key, ?value, ?default, "Configuration value out of range, using default");
                default
            }
            Err(err) => {
                warn!(key, error = %err, ?default, "Unusable configuration value, using default");
                default
            }
        }
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables (e.g. "SERVICE")
    namespace: Option<String>,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ServiceError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => {
                ServiceError::configuration(format!("Environment variable is not valid unicode: {}", env_key))
            }
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// Global default configuration provider: `ML_SERVICE_<KEY>`
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> =
    Lazy::new(|| Arc::new(EnvConfigProvider::new().with_prefix("ML").with_namespace("SERVICE")));

/// Trait for service-specific configuration
pub trait ServiceConfig: Debug + Send + Sync {
    fn validate(&self) -> Result<()>;

    fn service_name(&self) -> &str;
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Settings of the prediction service client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionServiceConfig {
    pub base_url: String,

    /// Sent as `X-API-Key` when present
    pub api_key: Option<String>,

    /// Per-attempt timeout
    pub timeout: Duration,

    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    pub failure_ratio_threshold: f64,
    pub window_size: usize,
    pub minimum_samples: usize,
    pub cooldown: Duration,
    pub half_open_trials: usize,
}

impl Default for PredictionServiceConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        let breaker = CircuitBreakerConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_millis(5000),
            max_attempts: retry.max_attempts,
            initial_backoff: retry.initial_interval,
            max_backoff: retry.max_interval,
            failure_ratio_threshold: breaker.failure_ratio_threshold,
            window_size: breaker.window_size,
            minimum_samples: breaker.minimum_samples,
            cooldown: breaker.cooldown,
            half_open_trials: breaker.half_open_trials,
        }
    }
}

impl PredictionServiceConfig {
    /// Load configuration from a config provider, defaulting anything missing or unusable
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();

        let base_url = provider.get_checked_or(
            "base_url",
            defaults.base_url.clone(),
            |p, k| p.get_string(k).map(|v| v.trim().trim_end_matches('/').to_string()),
            |v| url::Url::parse(v).is_ok(),
        );
        let window_size = provider.get_checked_or(
            "window_size",
            defaults.window_size,
            |p, k| p.get_int(k).map(|v| v.max(0) as usize),
            |v| *v > 0,
        );

        let config = Self {
            base_url,
            api_key: provider.get_optional("api_key"),
            timeout: provider.get_checked_or("timeout", defaults.timeout, |p, k| p.get_duration(k), |v| !v.is_zero()),
            max_attempts: provider.get_checked_or(
                "max_attempts",
                defaults.max_attempts,
                |p, k| p.get_int(k).map(|v| v.clamp(0, u32::MAX as i64) as u32),
                |v| *v >= 1,
            ),
            initial_backoff: provider.get_checked_or(
                "initial_backoff",
                defaults.initial_backoff,
                |p, k| p.get_duration(k),
                |_| true,
            ),
            max_backoff: provider.get_checked_or("max_backoff", defaults.max_backoff, |p, k| p.get_duration(k), |_| true),
            failure_ratio_threshold: provider.get_checked_or(
                "failure_ratio_threshold",
                defaults.failure_ratio_threshold,
                |p, k| p.get_float(k),
                |v| *v > 0.0 && *v <= 1.0,
            ),
            window_size,
            minimum_samples: provider.get_checked_or(
                "minimum_samples",
                window_size,
                |p, k| p.get_int(k).map(|v| v.max(0) as usize),
                |v| *v > 0 && *v <= window_size,
            ),
            cooldown: provider.get_checked_or("cooldown", defaults.cooldown, |p, k| p.get_duration(k), |_| true),
            half_open_trials: provider.get_checked_or(
                "half_open_trials",
                defaults.half_open_trials,
                |p, k| p.get_int(k).map(|v| v.max(0) as usize),
                |v| *v > 0,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from `ML_SERVICE_*` environment variables, or defaults if that fails
    pub fn from_env() -> Self {
        Self::from_provider(&**DEFAULT_PROVIDER).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to load prediction service config from environment, using defaults");
            Self::default()
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff.max(self.initial_backoff),
            ..RetryConfig::default()
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_ratio_threshold: self.failure_ratio_threshold,
            window_size: self.window_size,
            minimum_samples: self.minimum_samples,
            cooldown: self.cooldown,
            half_open_trials: self.half_open_trials,
        }
    }
}

impl ServiceConfig for PredictionServiceConfig {
    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ServiceError::configuration(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ServiceError::configuration(format!(
                "Base URL must be http(s): {}",
                self.base_url
            )));
        }

        if self.max_attempts == 0 {
            return Err(ServiceError::configuration("max_attempts must be at least 1"));
        }

        if !(self.failure_ratio_threshold > 0.0 && self.failure_ratio_threshold <= 1.0) {
            return Err(ServiceError::configuration("failure_ratio_threshold must be in (0, 1]"));
        }

        if self.window_size == 0 || self.minimum_samples == 0 || self.minimum_samples > self.window_size {
            return Err(ServiceError::configuration(
                "window_size must be positive and minimum_samples within 1..=window_size",
            ));
        }

        if self.half_open_trials == 0 {
            return Err(ServiceError::configuration("half_open_trials must be at least 1"));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "prediction-service"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_provider() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("key1", "value1");
        provider.set("key2", "123");

        assert_eq!(provider.get_string("key1").unwrap(), "value1");
        assert_eq!(provider.get_int("key2").unwrap(), 123);
        assert!(provider.get_string("key3").is_err());
    }

    #[test]
    fn test_env_key_format() {
        let provider = EnvConfigProvider::new().with_prefix("ML").with_namespace("SERVICE");

        assert_eq!(provider.format_key("api_key"), "ML_SERVICE_API_KEY");
        assert_eq!(provider.format_key("base-url"), "ML_SERVICE_BASE_URL");
    }

    #[test]
    fn test_unconfigured_uses_defaults() {
        let config = PredictionServiceConfig::from_provider(&MemoryConfigProvider::new()).unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.window_size, 10);
        assert_eq!(config.minimum_samples, 10);
        assert_eq!(config.half_open_trials, 3);
    }

    #[test]
    fn test_configured_values() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("base_url", "https://ml.internal:8443/");
        provider.set("api_key", "k-123");
        provider.set("timeout", "750ms");
        provider.set("max_attempts", "5");
        provider.set("failure_ratio_threshold", "0.25");
        provider.set("window_size", "20");
        provider.set("cooldown", "1m");
        provider.set("half_open_trials", "1");

        let config = PredictionServiceConfig::from_provider(&provider).unwrap();
        assert_eq!(config.base_url, "https://ml.internal:8443");
        assert_eq!(config.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.failure_ratio_threshold, 0.25);
        assert_eq!(config.window_size, 20);
        assert_eq!(config.minimum_samples, 20);
        assert_eq!(config.cooldown, Duration::from_secs(60));

        let breaker = config.circuit_breaker_config();
        assert_eq!(breaker.half_open_trials, 1);
        assert_eq!(config.retry_config().max_attempts, 5);
    }

    #[test]
    fn test_bad_values_fall_back_to_defaults() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("base_url", "not a url");
        provider.set("api_key", "   ");
        provider.set("max_attempts", "0");
        provider.set("failure_ratio_threshold", "1.5");
        provider.set("window_size", "ten");
        provider.set("minimum_samples", "50");
        provider.set("timeout", "0");

        let config = PredictionServiceConfig::from_provider(&provider).unwrap();
        let defaults = PredictionServiceConfig::default();
        assert_eq!(config.base_url, defaults.base_url);
        assert_eq!(config.api_key, None);
        assert_eq!(config.max_attempts, defaults.max_attempts);
        assert_eq!(config.failure_ratio_threshold, defaults.failure_ratio_threshold);
        assert_eq!(config.window_size, defaults.window_size);
        assert_eq!(config.minimum_samples, defaults.window_size);
        assert_eq!(config.timeout, defaults.timeout);
    }

    #[test]
    fn test_validation() {
        let config = PredictionServiceConfig {
            base_url: "ftp://ml.internal".to_string(),
            ..PredictionServiceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PredictionServiceConfig {
            minimum_samples: 11,
            ..PredictionServiceConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(PredictionServiceConfig::default().validate().is_ok());
    }
}

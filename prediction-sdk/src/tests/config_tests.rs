//! Tests for configuration management functionality
//!
//! These tests verify that environment configuration reaches the client.

#[cfg(test)]
mod tests {
    use std::env;
    use std::time::Duration;

    use crate::config::{ConfigProvider, ConfigProviderExt, EnvConfigProvider, PredictionServiceConfig};
    use crate::core::ClientBuilder;
    use crate::services::prediction::OperationKind;

    #[test]
    fn test_env_config_provider() {
        env::set_var("PROBE_TEST_SERVICE_BASE_URL", "http://ml.example:9000/");
        env::set_var("PROBE_TEST_SERVICE_TIMEOUT", "2s");
        env::set_var("PROBE_TEST_SERVICE_WINDOW_SIZE", "4");
        env::set_var("PROBE_TEST_SERVICE_HALF_OPEN_TRIALS", "many");

        let provider = EnvConfigProvider::new().with_prefix("PROBE_TEST").with_namespace("SERVICE");

        assert_eq!(provider.get_duration("timeout").unwrap(), Duration::from_secs(2));
        assert!(provider.get_string("missing").is_err());

        let config = PredictionServiceConfig::from_provider(&provider).unwrap();
        assert_eq!(config.base_url, "http://ml.example:9000");
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.window_size, 4);
        assert_eq!(config.minimum_samples, 4);
        assert_eq!(config.half_open_trials, PredictionServiceConfig::default().half_open_trials);

        env::remove_var("PROBE_TEST_SERVICE_BASE_URL");
        env::remove_var("PROBE_TEST_SERVICE_TIMEOUT");
        env::remove_var("PROBE_TEST_SERVICE_WINDOW_SIZE");
        env::remove_var("PROBE_TEST_SERVICE_HALF_OPEN_TRIALS");
    }

    #[test]
    fn test_client_from_config() {
        let config = PredictionServiceConfig {
            base_url: "https://ml.internal/".to_string(),
            api_key: Some("k-1".to_string()),
            timeout: Duration::from_millis(900),
            max_attempts: 4,
            window_size: 6,
            minimum_samples: 3,
            ..PredictionServiceConfig::default()
        };

        let client = ClientBuilder::from_config(&config).build().unwrap();

        assert_eq!(client.timeout(), Duration::from_millis(900));
        assert_eq!(client.retry_config().max_attempts, 4);

        let breaker = client.circuit_breaker(OperationKind::Clustering);
        assert_eq!(breaker.config().window_size, 6);
        assert_eq!(breaker.config().minimum_samples, 3);
        assert_eq!(breaker.name(), "clustering");
    }
}

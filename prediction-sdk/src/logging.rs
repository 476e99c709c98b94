//! # Structured Logging
//!
//! Subscriber setup for binaries embedding the client. The library itself
//! only emits `tracing` events; nothing is installed unless
//! [`init_logging`] is called.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigProvider, ConfigProviderExt};
use crate::error::{Result, ServiceError};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub level: String,
    /// Emit one JSON object per event instead of text
    pub json_format: bool,
    /// The service name for identification
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            service_name: "prediction-sdk".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Reads `log_level` and `log_json` from the provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Self {
        let defaults = Self::default();
        Self {
            level: provider.get_string_or("log_level", &defaults.level),
            json_format: provider
                .get_optional("log_json")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.json_format),
            service_name: provider.get_string_or("service_name", &defaults.service_name),
        }
    }
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ServiceError::configuration(format!("Invalid log level {}: {}", config.level, e)))?;

    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
    });
    let text_layer = (!config.json_format).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| ServiceError::internal(format!("Failed to set global subscriber: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );
    Ok(())
}

//! Configuration types for the alert-relay service.
//!
//! Every field carries a serde default so an entirely unconfigured
//! environment produces a runnable service; `validate()` catches the
//! combinations that defaults cannot make safe (a missing billing secret,
//! a zero timeout).

use alert_relay_core::outbound::retry::RetryPolicy;
use alert_relay_core::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Inbound billing webhook settings
    pub billing: BillingConfig,

    /// Outbound delivery settings
    pub delivery: DeliveryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Validate the assembled configuration.
    ///
    /// # Errors
    ///
    /// Returns the first field that cannot be used as configured.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.billing.secret.is_empty() {
            return Err(ValidationError::Required {
                field: "billing.secret".to_string(),
            });
        }

        if !self.billing.endpoint_path.starts_with('/') {
            return Err(ValidationError::InvalidFormat {
                field: "billing.endpoint_path".to_string(),
                message: "must start with '/'".to_string(),
            });
        }

        if self.delivery.request_timeout_seconds == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "delivery.request_timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "server.port".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Inbound billing webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Path the payment processor posts notifications to
    pub endpoint_path: String,

    /// Secret shared with the payment processor for signature verification
    pub secret: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhooks/billing".to_string(),
            secret: String::new(),
        }
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Per-attempt request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Retry attempts after the initial one
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Cap applied to backoff delays, in seconds
    pub max_delay_seconds: u64,

    /// Desynchronize retries with jitter
    pub use_jitter: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 10,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_seconds: 30,
            use_jitter: false,
        }
    }
}

impl DeliveryConfig {
    /// Per-attempt timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Build the core retry policy from the configured values.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_secs(self.max_delay_seconds),
            2.0,
        );
        if self.use_jitter {
            policy.with_jitter(0.25)
        } else {
            policy
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: String,

    /// Emit JSON log lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

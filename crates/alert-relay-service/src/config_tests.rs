//! Tests for service configuration defaults and validation

use super::*;
use std::time::Duration;

fn valid_config() -> ServiceConfig {
    ServiceConfig {
        billing: BillingConfig {
            secret: "platform-secret".to_string(),
            ..BillingConfig::default()
        },
        ..ServiceConfig::default()
    }
}

#[test]
fn test_defaults() {
    let config = ServiceConfig::default();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.billing.endpoint_path, "/webhooks/billing");
    assert_eq!(config.delivery.request_timeout_seconds, 10);
    assert_eq!(config.delivery.max_retries, 3);
    assert_eq!(config.delivery.base_delay_ms, 1000);
    assert!(!config.delivery.use_jitter);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_default_config_fails_validation_without_secret() {
    let err = ServiceConfig::default().validate().unwrap_err();
    assert!(matches!(err, ValidationError::Required { ref field } if field == "billing.secret"));
}

#[test]
fn test_valid_config_passes() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_endpoint_path_must_be_absolute() {
    let mut config = valid_config();
    config.billing.endpoint_path = "webhooks/billing".to_string();

    assert!(matches!(
        config.validate(),
        Err(ValidationError::InvalidFormat { .. })
    ));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let mut config = valid_config();
    config.delivery.request_timeout_seconds = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_retry_policy_reflects_delivery_config() {
    let config = valid_config();
    let policy = config.delivery.retry_policy();

    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.base_delay, Duration::from_secs(1));
    assert!(!policy.use_jitter);
    assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));

    assert_eq!(config.delivery.request_timeout(), Duration::from_secs(10));
}

#[test]
fn test_partial_file_fills_in_defaults() {
    // Operators typically set only the secret; everything else defaults.
    let loaded: ServiceConfig = config::Config::builder()
        .add_source(config::File::from_str(
            "billing:\n  secret: from-file\n",
            config::FileFormat::Yaml,
        ))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap();

    assert_eq!(loaded.billing.secret, "from-file");
    assert_eq!(loaded.server.port, 8080);
    assert_eq!(loaded.delivery.max_retries, 3);
    assert!(loaded.validate().is_ok());
}

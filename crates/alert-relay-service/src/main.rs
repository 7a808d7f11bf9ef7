//! # Alert-Relay Service
//!
//! Binary entry point for the alert-relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Wires the webhook engine to its stores and transport
//! - Starts the HTTP server with graceful shutdown

use alert_relay_core::inbound::handlers::HandlerRegistry;
use alert_relay_core::inbound::WebhookIngestor;
use alert_relay_core::outbound::delivery::DeliveryEngine;
use alert_relay_core::outbound::fanout::FanOutCoordinator;
use alert_relay_core::signature::WebhookSecret;
use alert_relay_service::stores::{
    InMemoryEndpointDirectory, InMemoryEventStore, InMemorySubscriptionStore,
    LoggingConfirmationSink,
};
use alert_relay_service::transport::ReqwestTransport;
use alert_relay_service::{router, AppState, ServiceConfig};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Layered sources, later overriding earlier:
    // /etc/alert-relay/service.yaml, ./config/service.yaml, an explicit
    // AR_CONFIG_FILE path, then AR__-prefixed environment variables
    // (AR__SERVER__PORT=9090 sets server.port).
    //
    // Absent files are fine because every field has a serde default. A file
    // or env value that fails to parse is a hard error: someone configured
    // the service on purpose and got it wrong. Reported on stderr since
    // logging is not up yet.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/alert-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("AR_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("AR").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to build configuration: {e}");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            eprintln!("Could not deserialize service configuration: {e}");
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        eprintln!("Service configuration is invalid: {e}");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Initialize logging
    //
    // RUST_LOG takes precedence; otherwise the configured level applies to
    // the whole process.
    // -------------------------------------------------------------------------
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&service_config.logging.level));

    if service_config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Alert-Relay Service");

    // -------------------------------------------------------------------------
    // Wire the engine
    // -------------------------------------------------------------------------
    let event_store = Arc::new(InMemoryEventStore::new());
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let confirmations = Arc::new(LoggingConfirmationSink::new());
    let registry = HandlerRegistry::new(subscriptions, confirmations);

    let ingestor = Arc::new(WebhookIngestor::new(
        WebhookSecret::new(service_config.billing.secret.clone()),
        event_store,
        registry,
    ));

    let transport = Arc::new(
        ReqwestTransport::new(service_config.delivery.request_timeout())
            .context("building outbound HTTP transport")?,
    );
    let engine = Arc::new(DeliveryEngine::new(
        transport,
        service_config.delivery.retry_policy(),
    ));
    let coordinator = Arc::new(FanOutCoordinator::new(engine));

    let endpoints = Arc::new(InMemoryEndpointDirectory::new());

    let state = AppState {
        ingestor,
        coordinator,
        endpoints,
    };

    // -------------------------------------------------------------------------
    // Serve
    // -------------------------------------------------------------------------
    let app = router(state, &service_config);
    let addr = format!(
        "{}:{}",
        service_config.server.host, service_config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    info!(
        addr = %addr,
        webhook_path = %service_config.billing.endpoint_path,
        "Alert-Relay Service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated abnormally")?;

    info!("Alert-Relay Service stopped");
    Ok(())
}

/// Resolve when the process receives SIGINT.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown signal handler");
        return;
    }
    info!("Shutdown signal received");
}

//! # Alert-Relay HTTP Service
//!
//! Hosts the webhook engine behind an HTTP surface:
//!
//! - Billing webhook intake from the payment processor (signature-verified,
//!   deduplicated, dispatched to handlers)
//! - Notification dispatch endpoint, the glue from the alert evaluation
//!   pipeline into the outbound fan-out
//! - Health probes
//!
//! Inbound handler failures deliberately map to non-2xx responses: the
//! payment processor's own at-least-once redelivery is the retry mechanism
//! for that half of the engine.

pub mod config;
pub mod stores;
pub mod transport;

use alert_relay_core::inbound::{InboundError, InboundRequest, IngestionOutcome, WebhookIngestor};
use alert_relay_core::outbound::delivery::{DeliveryOutcome, DeliveryResult};
use alert_relay_core::outbound::fanout::FanOutCoordinator;
use alert_relay_core::outbound::{Alert, SourceContext, SourceRef, TenantRef};
use alert_relay_core::EndpointId;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use config::ServiceConfig;
use stores::EndpointDirectory;

/// Header carrying the payment processor's signature over the raw body.
pub const HEADER_BILLING_SIGNATURE: &str = "X-Billing-Signature";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Inbound verifier and dispatcher
    pub ingestor: Arc<WebhookIngestor>,

    /// Outbound fan-out coordinator
    pub coordinator: Arc<FanOutCoordinator>,

    /// Endpoint lookup by tenant
    pub endpoints: Arc<dyn EndpointDirectory>,
}

/// Build the service router.
pub fn router(state: AppState, config: &ServiceConfig) -> Router {
    Router::new()
        .route(
            &config.billing.endpoint_path,
            post(receive_billing_webhook),
        )
        .route("/api/notifications/dispatch", post(dispatch_notification))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Inbound Webhook Endpoint
// ============================================================================

/// Receive one signed notification from the payment processor.
///
/// Responds 2xx when the event was handled or deliberately ignored, and
/// non-2xx otherwise so the processor's redelivery mechanism kicks in.
async fn receive_billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let signature = headers
        .get(HEADER_BILLING_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let request = InboundRequest::new(body, signature);

    match state.ingestor.ingest(request).await {
        Ok(IngestionOutcome::Processed {
            event_id,
            transition_occurred,
        }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "processed",
                "event_id": event_id.as_str(),
                "transition_occurred": transition_occurred,
            })),
        ),
        Ok(IngestionOutcome::IgnoredUnknownType {
            event_id,
            event_type,
        }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ignored",
                "event_id": event_id.as_str(),
                "event_type": event_type,
            })),
        ),
        Err(error) => {
            let status = inbound_status(&error);

            if status.is_server_error() {
                error!(error = %error, "Inbound webhook processing failed");
            } else {
                warn!(error = %error, "Inbound webhook rejected");
            }

            (
                status,
                Json(serde_json::json!({
                    "status": "error",
                    "error": error.to_string(),
                })),
            )
        }
    }
}

/// Map an ingestion failure to an HTTP status.
///
/// 5xx answers invite a processor redelivery; 4xx answers do not carry
/// that meaning for signature and payload defects, which a retry of the
/// same bytes cannot fix.
fn inbound_status(error: &InboundError) -> StatusCode {
    match error {
        InboundError::SignatureMissing => StatusCode::UNAUTHORIZED,
        InboundError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        InboundError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
        InboundError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        InboundError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Notification Dispatch Endpoint
// ============================================================================

/// Alert batch handed over by the alert evaluation pipeline.
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub tenant: TenantRef,
    pub source: SourceRef,
    pub items: Vec<Alert>,
}

/// Per-endpoint outcome summary returned to the caller.
#[derive(Debug, Serialize)]
pub struct EndpointOutcome {
    pub endpoint_id: EndpointId,
    pub outcome: &'static str,
    pub status: Option<u16>,
    pub attempts: u32,
}

impl From<&DeliveryResult> for EndpointOutcome {
    fn from(result: &DeliveryResult) -> Self {
        let (outcome, status) = match &result.outcome {
            DeliveryOutcome::Delivered { status } => ("delivered", Some(*status)),
            DeliveryOutcome::Rejected { status } => ("rejected", Some(*status)),
            DeliveryOutcome::Exhausted { last_status, .. } => ("exhausted", *last_status),
            DeliveryOutcome::Aborted { .. } => ("aborted", None),
        };
        Self {
            endpoint_id: result.endpoint_id,
            outcome,
            status,
            attempts: result.attempts,
        }
    }
}

/// Aggregate response for one dispatched notification cycle.
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub notification_id: String,
    pub delivered: usize,
    pub failed: usize,
    pub results: Vec<EndpointOutcome>,
}

/// Compose and fan a notification out to the tenant's endpoints.
async fn dispatch_notification(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, (StatusCode, Json<serde_json::Value>)> {
    let tenant_id = request.tenant.id;

    let endpoints = state
        .endpoints
        .list_for_tenant(tenant_id)
        .await
        .map_err(|e| {
            error!(tenant_id = %tenant_id, error = %e, "Endpoint lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })?;

    let ctx = SourceContext {
        tenant: request.tenant,
        source: request.source,
    };

    let report = state
        .coordinator
        .notify(&endpoints, request.items, &ctx)
        .await
        .map_err(|e| {
            error!(tenant_id = %tenant_id, error = %e, "Payload composition failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })?;

    info!(
        notification_id = %report.notification_id,
        tenant_id = %tenant_id,
        delivered = report.delivered_count(),
        failed = report.failed_count(),
        "Notification dispatched"
    );

    Ok(Json(DispatchResponse {
        notification_id: report.notification_id.to_string(),
        delivered: report.delivered_count(),
        failed: report.failed_count(),
        results: report.results.iter().map(EndpointOutcome::from).collect(),
    }))
}

// ============================================================================
// Health Endpoints
// ============================================================================

async fn liveness() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

async fn readiness() -> (StatusCode, Json<serde_json::Value>) {
    // No external dependencies are required to accept traffic: stores are
    // injected and failures surface per-request.
    (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod lib_tests;

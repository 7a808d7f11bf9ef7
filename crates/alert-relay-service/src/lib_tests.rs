//! Tests for the HTTP surface: status mapping and endpoint wiring

use super::*;
use crate::stores::{
    InMemoryEndpointDirectory, InMemoryEventStore, InMemorySubscriptionStore,
    LoggingConfirmationSink,
};
use alert_relay_core::inbound::handlers::HandlerRegistry;
use alert_relay_core::outbound::delivery::{
    DeliveryEngine, DeliveryRequest, TransportError, TransportResponse, WebhookTransport,
};
use alert_relay_core::outbound::retry::RetryPolicy;
use alert_relay_core::outbound::{Endpoint, EndpointKind, PayloadVersion, Severity};
use alert_relay_core::signature::{signature_header_value, WebhookSecret};
use alert_relay_core::{EndpointId, TenantId, Timestamp};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use url::Url;

const PLATFORM_SECRET: &str = "platform-secret";

/// Transport stub that accepts everything with 200.
struct AcceptAllTransport;

#[async_trait]
impl WebhookTransport for AcceptAllTransport {
    async fn post(&self, _request: DeliveryRequest) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse { status: 200 })
    }
}

fn test_state() -> (AppState, Arc<InMemoryEndpointDirectory>) {
    let event_store = Arc::new(InMemoryEventStore::new());
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let confirmations = Arc::new(LoggingConfirmationSink::new());
    let registry = HandlerRegistry::new(subscriptions, confirmations);

    let ingestor = Arc::new(WebhookIngestor::new(
        WebhookSecret::new(PLATFORM_SECRET),
        event_store,
        registry,
    ));

    let engine = Arc::new(DeliveryEngine::new(
        Arc::new(AcceptAllTransport),
        RetryPolicy::default(),
    ));
    let coordinator = Arc::new(FanOutCoordinator::new(engine));
    let endpoints = Arc::new(InMemoryEndpointDirectory::new());

    let state = AppState {
        ingestor,
        coordinator,
        endpoints: endpoints.clone(),
    };
    (state, endpoints)
}

fn app() -> Router {
    let (state, _) = test_state();
    test_router(state)
}

fn test_router(state: AppState) -> Router {
    let config = ServiceConfig::default();
    router(state, &config)
}

fn billing_body(event_id: &str, event_type: &str) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "subscription_id": "sub_1", "plan": "team" }
    })
    .to_string()
    .into_bytes()
}

fn signed_webhook_request(body: Vec<u8>) -> Request<Body> {
    let signature = signature_header_value(&body, &WebhookSecret::new(PLATFORM_SECRET));
    Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header("Content-Type", "application/json")
        .header(HEADER_BILLING_SIGNATURE, signature)
        .body(Body::from(body))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Inbound Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_valid_webhook_returns_200_processed() {
    let body = billing_body("evt_1", "customer.subscription.created");
    let response = app().oneshot(signed_webhook_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "processed");
    assert_eq!(json["event_id"], "evt_1");
}

#[tokio::test]
async fn test_missing_signature_returns_401() {
    let body = billing_body("evt_1", "customer.subscription.created");
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_body_returns_401() {
    let original = billing_body("evt_1", "customer.subscription.created");
    let signature = signature_header_value(&original, &WebhookSecret::new(PLATFORM_SECRET));

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header("Content-Type", "application/json")
        .header(HEADER_BILLING_SIGNATURE, signature)
        .body(Body::from(billing_body("evt_other", "customer.subscription.created")))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_garbage_returns_400() {
    let body = b"definitely not json".to_vec();
    let response = app().oneshot(signed_webhook_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_event_type_is_acknowledged_with_200() {
    let body = billing_body("evt_9", "charge.refund.updated");
    let response = app().oneshot(signed_webhook_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["event_type"], "charge.refund.updated");
}

// ============================================================================
// Dispatch Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_dispatch_fans_out_to_registered_endpoints() {
    let (state, endpoints) = test_state();
    let tenant_id = TenantId::new();

    endpoints.register(
        tenant_id,
        Endpoint {
            id: EndpointId::new(),
            url: Url::parse("https://hooks.example.com/a").unwrap(),
            kind: EndpointKind::Generic,
            secret: Some(WebhookSecret::new("ep-secret")),
            enabled: true,
            payload_version: PayloadVersion::V1,
        },
    );
    endpoints.register(
        tenant_id,
        Endpoint {
            id: EndpointId::new(),
            url: Url::parse("https://hooks.example.com/b").unwrap(),
            kind: EndpointKind::Chat,
            secret: None,
            enabled: false,
            payload_version: PayloadVersion::V1,
        },
    );

    let body = serde_json::json!({
        "tenant": { "id": tenant_id, "name": "Acme" },
        "source": { "id": "srv_1", "name": "broker-7" },
        "items": [{
            "id": "al_1",
            "check": "queue_depth",
            "message": "queue jobs above 10k messages",
            "severity": "critical",
            "raised_at": Timestamp::now(),
        }],
    });

    let request = Request::builder()
        .method("POST")
        .uri("/api/notifications/dispatch")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = test_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    // Only the enabled endpoint was dispatched to.
    assert_eq!(json["delivered"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
    assert_eq!(json["results"][0]["outcome"], "delivered");
    assert_eq!(json["results"][0]["attempts"], 1);
}

#[tokio::test]
async fn test_dispatch_with_no_endpoints_is_a_successful_no_op() {
    let body = serde_json::json!({
        "tenant": { "id": TenantId::new(), "name": "Acme" },
        "source": { "id": "srv_1", "name": "broker-7" },
        "items": [],
    });

    let request = Request::builder()
        .method("POST")
        .uri("/api/notifications/dispatch")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["delivered"], 0);
    assert_eq!(json["failed"], 0);
}

// ============================================================================
// Health Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoints_respond_200() {
    for path in ["/health/live", "/health/ready"] {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "path {}", path);
    }
}

#[tokio::test]
async fn test_severity_deserializes_from_lowercase_tag() {
    let severity: Severity = serde_json::from_str("\"critical\"").unwrap();
    assert_eq!(severity, Severity::Critical);
}

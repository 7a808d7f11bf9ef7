//! Tests for the delivery engine retry loop and request assembly

use super::*;
use crate::outbound::{Alert, ComposedPayload, Severity, SourceContext, SourceRef, TenantRef};
use crate::signature::{verify_payload, WebhookSecret};
use crate::{TenantId, Timestamp};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Test Fakes
// ============================================================================

/// Transport that replays a scripted sequence of responses and records every
/// request together with the (virtual) time it arrived.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<(DeliveryRequest, Instant)>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn always_status(status: u16) -> Arc<Self> {
        // More entries than any bounded retry loop will consume.
        Self::new(vec![Ok(TransportResponse { status }); 16])
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> DeliveryRequest {
        self.requests.lock().unwrap()[index].0.clone()
    }

    fn arrival_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn post(&self, request: DeliveryRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push((request, Instant::now()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(TransportResponse { status: 200 }))
    }
}

fn generic_endpoint(secret: Option<&str>) -> Endpoint {
    Endpoint {
        id: EndpointId::new(),
        url: Url::parse("https://hooks.example.com/alerts").unwrap(),
        kind: EndpointKind::Generic,
        secret: secret.map(WebhookSecret::new),
        enabled: true,
        payload_version: crate::outbound::PayloadVersion::V1,
    }
}

fn chat_endpoint() -> Endpoint {
    Endpoint {
        kind: EndpointKind::Chat,
        ..generic_endpoint(None)
    }
}

fn composed() -> ComposedPayload {
    let ctx = SourceContext {
        tenant: TenantRef {
            id: TenantId::new(),
            name: "Acme".to_string(),
        },
        source: SourceRef {
            id: "srv_1".to_string(),
            name: "broker-7".to_string(),
        },
    };
    let items = vec![Alert {
        id: "al_1".to_string(),
        check: "queue_depth".to_string(),
        message: "queue jobs above 10k messages".to_string(),
        severity: Severity::Critical,
        raised_at: Timestamp::now(),
    }];
    ComposedPayload::compose(items, &ctx, Timestamp::now()).unwrap()
}

fn engine(transport: Arc<ScriptedTransport>) -> DeliveryEngine {
    DeliveryEngine::new(transport, RetryPolicy::default())
}

fn header<'a>(request: &'a DeliveryRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

// ============================================================================
// Retry Loop Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_persistent_500_makes_four_attempts_with_backoff() {
    let transport = ScriptedTransport::always_status(500);
    let endpoint = generic_endpoint(None);

    let result = engine(transport.clone()).deliver(&endpoint, &composed()).await;

    assert_eq!(result.attempts, 4);
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Exhausted {
            last_status: Some(500),
            last_error: None,
        }
    );

    // Gaps between attempts follow the 1s, 2s, 4s schedule.
    let times = transport.arrival_times();
    assert_eq!(times.len(), 4);
    assert_eq!(times[1] - times[0], Duration::from_secs(1));
    assert_eq!(times[2] - times[1], Duration::from_secs(2));
    assert_eq!(times[3] - times[2], Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_404_is_rejected_immediately_without_backoff() {
    let transport = ScriptedTransport::always_status(404);
    let endpoint = generic_endpoint(None);

    let start = Instant::now();
    let result = engine(transport.clone()).deliver(&endpoint, &composed()).await;

    assert_eq!(result.attempts, 1);
    assert_eq!(result.outcome, DeliveryOutcome::Rejected { status: 404 });
    assert_eq!(transport.request_count(), 1);
    assert_eq!(Instant::now() - start, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_429_is_retried() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse { status: 429 }),
        Ok(TransportResponse { status: 200 }),
    ]);
    let endpoint = generic_endpoint(None);

    let result = engine(transport.clone()).deliver(&endpoint, &composed()).await;

    assert_eq!(result.attempts, 2);
    assert_eq!(result.outcome, DeliveryOutcome::Delivered { status: 200 });

    let times = transport.arrival_times();
    assert_eq!(times[1] - times[0], Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_treated_as_transient() {
    let transport = ScriptedTransport::new(vec![
        Err(TransportError::Timeout),
        Ok(TransportResponse { status: 204 }),
    ]);
    let endpoint = generic_endpoint(None);

    let result = engine(transport).deliver(&endpoint, &composed()).await;

    assert_eq!(result.attempts, 2);
    assert_eq!(result.outcome, DeliveryOutcome::Delivered { status: 204 });
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_reports_last_transport_error() {
    let transport = ScriptedTransport::new(vec![
        Err(TransportError::Connect {
            message: "connection refused".to_string(),
        });
        8
    ]);
    let endpoint = generic_endpoint(None);

    let result = engine(transport.clone()).deliver(&endpoint, &composed()).await;

    assert_eq!(result.attempts, 4);
    assert!(matches!(
        result.outcome,
        DeliveryOutcome::Exhausted {
            last_status: None,
            last_error: Some(_),
        }
    ));
    assert_eq!(transport.request_count(), 4);
}

#[tokio::test]
async fn test_first_try_success_makes_one_attempt() {
    let transport = ScriptedTransport::always_status(200);
    let endpoint = generic_endpoint(Some("ep-secret"));

    let result = engine(transport.clone()).deliver(&endpoint, &composed()).await;

    assert_eq!(result.attempts, 1);
    assert!(result.outcome.is_success());
    assert_eq!(result.endpoint_id, endpoint.id);
}

// ============================================================================
// Request Assembly Tests
// ============================================================================

#[tokio::test]
async fn test_generic_request_carries_full_header_set() {
    let transport = ScriptedTransport::always_status(200);
    let endpoint = generic_endpoint(Some("ep-secret"));
    let payload = composed();

    engine(transport.clone()).deliver(&endpoint, &payload).await;

    let request = transport.request(0);
    assert_eq!(header(&request, "Content-Type"), Some("application/json"));
    assert_eq!(header(&request, "User-Agent"), Some(USER_AGENT));
    assert_eq!(header(&request, HEADER_EVENT), Some("alert.notification"));
    assert_eq!(header(&request, HEADER_VERSION), Some("v1"));
    assert_eq!(header(&request, HEADER_TIMESTAMP), Some(payload.timestamp()));

    let signature = header(&request, HEADER_SIGNATURE).unwrap();
    assert!(signature.starts_with("sha256="));
    assert!(verify_payload(
        &request.body,
        signature,
        &WebhookSecret::new("ep-secret")
    ));
}

#[tokio::test]
async fn test_signature_header_absent_without_secret() {
    let transport = ScriptedTransport::always_status(200);
    let endpoint = generic_endpoint(None);

    engine(transport.clone()).deliver(&endpoint, &composed()).await;

    assert!(header(&transport.request(0), HEADER_SIGNATURE).is_none());
}

#[tokio::test]
async fn test_chat_endpoint_gets_text_body_and_no_signature() {
    let transport = ScriptedTransport::always_status(200);
    let endpoint = chat_endpoint();
    let payload = composed();

    engine(transport.clone()).deliver(&endpoint, &payload).await;

    let request = transport.request(0);
    assert_eq!(request.body, payload.chat_body());
    assert!(header(&request, HEADER_SIGNATURE).is_none());
    assert!(header(&request, HEADER_EVENT).is_none());

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    let text = body.get("text").and_then(|t| t.as_str()).unwrap();
    assert!(text.contains("broker-7"));
    assert!(text.contains("queue_depth"));
}

#[tokio::test(start_paused = true)]
async fn test_retries_resend_identical_bytes_and_signature() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse { status: 503 }),
        Ok(TransportResponse { status: 200 }),
    ]);
    let endpoint = generic_endpoint(Some("ep-secret"));

    engine(transport.clone()).deliver(&endpoint, &composed()).await;

    let first = transport.request(0);
    let second = transport.request(1);
    assert_eq!(first.body, second.body);
    assert_eq!(
        header(&first, HEADER_SIGNATURE),
        header(&second, HEADER_SIGNATURE)
    );
}

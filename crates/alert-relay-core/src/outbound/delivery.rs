//! # Delivery Engine
//!
//! Delivers a composed payload to a single endpoint: one HTTP POST per
//! attempt under a bounded timeout, with exponential-backoff retries for
//! transient failure classes (HTTP 5xx, 429, timeout, network error).
//!
//! The HTTP transport is an injected trait so the whole engine is testable
//! with a deterministic, network-free fake. Every outcome — success,
//! permanent rejection, exhausted retries — is a typed result value; the
//! engine never throws delivery failures at the caller.

use super::retry::{RetryPolicy, RetryState};
use super::{ComposedPayload, Endpoint, EndpointKind};
use crate::signature::signature_header_value;
use crate::EndpointId;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

// ============================================================================
// Outbound Header Set
// ============================================================================

/// Event-type header carried on every generic delivery.
pub const HEADER_EVENT: &str = "X-Relay-Event";
/// Payload schema version header.
pub const HEADER_VERSION: &str = "X-Relay-Version";
/// Cycle timestamp header (RFC 3339).
pub const HEADER_TIMESTAMP: &str = "X-Relay-Timestamp";
/// Signature header, `sha256=<hex>`; present only when the endpoint has a secret.
pub const HEADER_SIGNATURE: &str = "X-Relay-Signature";
/// User-Agent identifier for outbound requests.
pub const USER_AGENT: &str = concat!("alert-relay/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Transport Seam
// ============================================================================

/// One outbound HTTP POST, fully assembled.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Response observed by the transport (status only; bodies are ignored).
#[derive(Debug, Clone, Copy)]
pub struct TransportResponse {
    pub status: u16,
}

/// Failures below the HTTP status level.
///
/// All variants are transient by definition: a timeout or connection error
/// says nothing permanent about the receiver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {message}")]
    Connect { message: String },

    #[error("I/O failure: {message}")]
    Io { message: String },
}

/// Injected HTTP transport.
///
/// The concrete implementation owns the per-attempt timeout (10 seconds in
/// production) and must report exceeding it as [`TransportError::Timeout`],
/// which the engine treats identically to a network error. Cancelling a
/// timed-out attempt must not affect any other in-flight delivery.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Execute one POST attempt.
    async fn post(&self, request: DeliveryRequest) -> Result<TransportResponse, TransportError>;
}

// ============================================================================
// Delivery Results
// ============================================================================

/// Classification of a single attempt, recorded for logging and discarded.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub endpoint_id: EndpointId,
    pub attempt_number: u32,
    pub outcome: AttemptClass,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
}

/// Attempt outcome classes driving the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// Final outcome of one endpoint's delivery chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A 2xx response was observed.
    Delivered { status: u16 },

    /// Non-retryable HTTP status (4xx other than 429); no retries attempted.
    Rejected { status: u16 },

    /// Transient failures persisted through every allowed retry.
    Exhausted {
        last_status: Option<u16>,
        last_error: Option<String>,
    },

    /// The delivery task itself died (panic or cancellation); recorded by
    /// the fan-out coordinator so one endpoint's fault stays its own.
    Aborted { reason: String },
}

impl DeliveryOutcome {
    /// Check whether the payload reached the endpoint.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Result of one endpoint's delivery, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub endpoint_id: EndpointId,
    pub outcome: DeliveryOutcome,
    /// Attempts actually made (1 initial + retries).
    pub attempts: u32,
}

// ============================================================================
// Delivery Engine
// ============================================================================

/// Delivers composed payloads to endpoints with retry and backoff.
pub struct DeliveryEngine {
    transport: Arc<dyn WebhookTransport>,
    policy: RetryPolicy,
}

impl DeliveryEngine {
    /// Create an engine over an injected transport and retry policy.
    pub fn new(transport: Arc<dyn WebhookTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver the composed payload to one endpoint.
    ///
    /// Runs the bounded retry loop: transient failures (HTTP 5xx, 429,
    /// timeout, network error) back off `base * 2^attempt` and retry while
    /// attempts remain; any other non-2xx status is terminal immediately.
    /// The same payload bytes — and therefore the same signature — are sent
    /// on every attempt.
    pub async fn deliver(&self, endpoint: &Endpoint, payload: &ComposedPayload) -> DeliveryResult {
        let request = build_request(endpoint, payload);
        let mut retry_state = RetryState::new();

        loop {
            let attempt = self.attempt_once(endpoint, &request, &retry_state).await;

            debug!(
                endpoint_id = %attempt.endpoint_id,
                attempt = attempt.attempt_number,
                outcome = ?attempt.outcome,
                status = ?attempt.status_code,
                "Delivery attempt finished"
            );

            match attempt.outcome {
                AttemptClass::Success => {
                    info!(
                        endpoint_id = %endpoint.id,
                        status = ?attempt.status_code,
                        attempts = retry_state.total_attempts,
                        "Payload delivered"
                    );

                    return DeliveryResult {
                        endpoint_id: endpoint.id,
                        outcome: DeliveryOutcome::Delivered {
                            status: attempt.status_code.unwrap_or(200),
                        },
                        attempts: retry_state.total_attempts,
                    };
                }

                AttemptClass::PermanentFailure => {
                    warn!(
                        endpoint_id = %endpoint.id,
                        status = ?attempt.status_code,
                        attempts = retry_state.total_attempts,
                        "Delivery rejected; not retrying"
                    );

                    return DeliveryResult {
                        endpoint_id: endpoint.id,
                        outcome: DeliveryOutcome::Rejected {
                            status: attempt.status_code.unwrap_or(0),
                        },
                        attempts: retry_state.total_attempts,
                    };
                }

                AttemptClass::TransientFailure => {
                    if retry_state.can_retry(&self.policy) {
                        let delay = retry_state.get_delay(&self.policy);

                        warn!(
                            endpoint_id = %endpoint.id,
                            attempt = retry_state.total_attempts,
                            delay_ms = delay.as_millis(),
                            status = ?attempt.status_code,
                            error = ?attempt.error_message,
                            "Transient delivery failure; backing off before retry"
                        );

                        tokio::time::sleep(delay).await;
                        retry_state.next_attempt();
                        continue;
                    }

                    warn!(
                        endpoint_id = %endpoint.id,
                        attempts = retry_state.total_attempts,
                        status = ?attempt.status_code,
                        error = ?attempt.error_message,
                        "Delivery retries exhausted"
                    );

                    return DeliveryResult {
                        endpoint_id: endpoint.id,
                        outcome: DeliveryOutcome::Exhausted {
                            last_status: attempt.status_code,
                            last_error: attempt.error_message,
                        },
                        attempts: retry_state.total_attempts,
                    };
                }
            }
        }
    }

    /// Execute and classify a single attempt.
    async fn attempt_once(
        &self,
        endpoint: &Endpoint,
        request: &DeliveryRequest,
        retry_state: &RetryState,
    ) -> DeliveryAttempt {
        match self.transport.post(request.clone()).await {
            Ok(response) => DeliveryAttempt {
                endpoint_id: endpoint.id,
                attempt_number: retry_state.total_attempts,
                outcome: classify_status(response.status),
                status_code: Some(response.status),
                error_message: None,
            },
            Err(error) => DeliveryAttempt {
                endpoint_id: endpoint.id,
                attempt_number: retry_state.total_attempts,
                outcome: AttemptClass::TransientFailure,
                status_code: None,
                error_message: Some(error.to_string()),
            },
        }
    }
}

/// Classify an HTTP status into an attempt outcome.
///
/// 2xx succeeds; 429 and 5xx are transient; everything else is permanent.
fn classify_status(status: u16) -> AttemptClass {
    match status {
        200..=299 => AttemptClass::Success,
        429 => AttemptClass::TransientFailure,
        500..=599 => AttemptClass::TransientFailure,
        _ => AttemptClass::PermanentFailure,
    }
}

/// Assemble the request for an endpoint: body by kind, headers, signature.
///
/// Built once per delivery so every retry reuses the identical bytes and
/// header set.
fn build_request(endpoint: &Endpoint, payload: &ComposedPayload) -> DeliveryRequest {
    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), USER_AGENT.to_string()),
    ];

    let body = match endpoint.kind {
        EndpointKind::Generic => {
            headers.push((HEADER_EVENT.to_string(), payload.payload().event.clone()));
            headers.push((
                HEADER_VERSION.to_string(),
                endpoint.payload_version.as_str().to_string(),
            ));
            headers.push((
                HEADER_TIMESTAMP.to_string(),
                payload.timestamp().to_string(),
            ));

            let body = payload.body();
            if let Some(secret) = &endpoint.secret {
                headers.push((
                    HEADER_SIGNATURE.to_string(),
                    signature_header_value(&body, secret),
                ));
            }
            body
        }
        // Chat-platform webhooks take the text rendering and no signature.
        EndpointKind::Chat => payload.chat_body(),
    };

    DeliveryRequest {
        url: endpoint.url.clone(),
        headers,
        body,
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;

//! # Inbound Webhook Ingestion
//!
//! Receives signed event notifications from the payment processor, verifies
//! authenticity against the raw request body, deduplicates at-least-once
//! deliveries by the processor-assigned event id, and dispatches to the
//! handler registry.
//!
//! Pipeline per request: received → verified → deduplicated → dispatched →
//! processed | failed. Handler failures surface as errors so the processor's
//! own redelivery mechanism retries later; handlers are therefore required
//! to be idempotent (see [`handlers`]).

use crate::signature::{verify_payload, WebhookSecret};
use crate::{StateStoreError, Timestamp, ValidationError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub mod handlers;

use handlers::{DispatchOutcome, HandlerError, HandlerRegistry};

// ============================================================================
// Core Types
// ============================================================================

/// Processor-assigned, globally unique event identifier.
///
/// This is the deduplication key: a second delivery with the same id must
/// not apply handler side effects twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProviderEventId(String);

impl ProviderEventId {
    /// Wrap a non-empty processor event id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::Required {
                field: "event_id".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Get string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw inbound HTTP request data, captured before any parsing.
///
/// Signature verification runs over `body` exactly as received; a
/// re-serialized form would not reproduce the processor's digest.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub body: Bytes,
    pub signature: Option<String>,
    pub received_at: Timestamp,
}

impl InboundRequest {
    /// Create a new inbound request.
    pub fn new(body: Bytes, signature: Option<String>) -> Self {
        Self {
            body,
            signature,
            received_at: Timestamp::now(),
        }
    }
}

/// One notification from the payment processor, as persisted for dedup.
///
/// Lifecycle: created on first receipt with `processed = false`, flipped to
/// `true` on successful handling. A redelivery with the same id resets
/// `processed` to `false` so the repeat attempt is possible.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InboundEvent {
    pub id: ProviderEventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub received_at: Timestamp,
}

/// Wire shape of the processor's notification envelope.
#[derive(Debug, Deserialize)]
struct ProviderNotification {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Outcome of a successfully acknowledged inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    /// A registered handler reconciled state for this event.
    Processed {
        event_id: ProviderEventId,
        transition_occurred: bool,
    },

    /// No handler is registered for this event type; acknowledged as a
    /// no-op so the processor does not redeliver events we ignore.
    IgnoredUnknownType {
        event_id: ProviderEventId,
        event_type: String,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Failures while ingesting an inbound webhook request.
///
/// The hosting HTTP layer maps these onto response statuses: signature
/// failures reject the request before any mutation, store and handler
/// failures become non-2xx responses so the processor redelivers.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("Signature header missing")]
    SignatureMissing,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Malformed notification payload: {message}")]
    MalformedPayload { message: String },

    #[error("Event store failure: {0}")]
    Store(#[from] StateStoreError),

    #[error("Handler failure: {0}")]
    Handler(#[from] HandlerError),
}

impl InboundError {
    /// Check whether the processor should redeliver this event.
    ///
    /// Signature and payload failures are permanent for this delivery; a
    /// corrected redelivery is the processor's decision. Store and handler
    /// failures are worth a retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SignatureMissing => false,
            Self::SignatureInvalid => false,
            Self::MalformedPayload { .. } => false,
            Self::Store(e) => e.is_transient(),
            Self::Handler(e) => e.is_transient(),
        }
    }
}

// ============================================================================
// Event Store Seam
// ============================================================================

/// Persistence contract for inbound event deduplication.
///
/// `upsert_by_provider_id` must be atomic at the id key; it is the only
/// serialization point for duplicate-id detection. If the row already
/// exists, the implementation replaces payload and receipt time and resets
/// `processed` to `false` regardless of prior outcome, so a
/// processor-initiated redelivery always gets a reprocessing attempt.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert or update the event row keyed by its provider id, returning
    /// the stored state.
    async fn upsert_by_provider_id(
        &self,
        event: InboundEvent,
    ) -> Result<InboundEvent, StateStoreError>;

    /// Flip `processed` to `true` after successful handling.
    async fn mark_processed(&self, id: &ProviderEventId) -> Result<(), StateStoreError>;
}

// ============================================================================
// Ingestor
// ============================================================================

/// Inbound verifier and dispatcher.
///
/// Owns the platform secret shared with the payment processor and the
/// injected persistence/handler dependencies. All failure paths resolve to
/// [`InboundError`]; nothing here panics on bad input.
pub struct WebhookIngestor {
    platform_secret: WebhookSecret,
    event_store: Arc<dyn EventStore>,
    registry: HandlerRegistry,
}

impl WebhookIngestor {
    /// Create a new ingestor.
    ///
    /// # Arguments
    ///
    /// * `platform_secret` - Secret shared with the payment processor,
    ///   used to verify inbound signatures.
    /// * `event_store` - Dedup store with atomic upsert-by-id.
    /// * `registry` - Handler registry for state reconciliation.
    pub fn new(
        platform_secret: WebhookSecret,
        event_store: Arc<dyn EventStore>,
        registry: HandlerRegistry,
    ) -> Self {
        Self {
            platform_secret,
            event_store,
            registry,
        }
    }

    /// Ingest one inbound webhook request.
    ///
    /// # Errors
    ///
    /// * [`InboundError::SignatureMissing`] / [`InboundError::SignatureInvalid`] -
    ///   rejected before any mutation; no event row is written.
    /// * [`InboundError::MalformedPayload`] - body verified but not parseable
    ///   as a notification envelope.
    /// * [`InboundError::Store`] / [`InboundError::Handler`] - surfaced so the
    ///   hosting layer responds non-2xx and the processor redelivers.
    pub async fn ingest(&self, request: InboundRequest) -> Result<IngestionOutcome, InboundError> {
        // 1. Verify authenticity over the exact raw body bytes.
        let signature = request
            .signature
            .as_deref()
            .ok_or(InboundError::SignatureMissing)?;

        if !verify_payload(&request.body, signature, &self.platform_secret) {
            warn!(
                body_len = request.body.len(),
                "Rejected inbound webhook with invalid signature"
            );
            return Err(InboundError::SignatureInvalid);
        }

        // 2. Parse the notification envelope.
        let notification: ProviderNotification = serde_json::from_slice(&request.body)
            .map_err(|e| InboundError::MalformedPayload {
                message: e.to_string(),
            })?;

        let event_id = ProviderEventId::new(notification.id.clone()).map_err(|_| {
            InboundError::MalformedPayload {
                message: "notification id is empty".to_string(),
            }
        })?;

        // 3. Deduplicate: upsert resets `processed` on redelivery.
        let stored = self
            .event_store
            .upsert_by_provider_id(InboundEvent {
                id: event_id.clone(),
                event_type: notification.event_type.clone(),
                payload: notification.data.clone(),
                processed: false,
                received_at: request.received_at,
            })
            .await?;

        info!(
            event_id = %stored.id,
            event_type = %stored.event_type,
            "Inbound event verified and recorded"
        );

        // 4. Dispatch to the handler registry.
        match self
            .registry
            .dispatch(&notification.event_type, &notification.data)
            .await?
        {
            DispatchOutcome::Reconciled {
                transition_occurred,
            } => {
                self.event_store.mark_processed(&event_id).await?;

                info!(
                    event_id = %event_id,
                    event_type = %notification.event_type,
                    transition_occurred,
                    "Inbound event processed"
                );

                Ok(IngestionOutcome::Processed {
                    event_id,
                    transition_occurred,
                })
            }
            DispatchOutcome::Ignored => {
                // Nothing for us to reconcile; acknowledge so the processor
                // does not redeliver event types we do not care about.
                self.event_store.mark_processed(&event_id).await?;

                info!(
                    event_id = %event_id,
                    event_type = %notification.event_type,
                    "Ignoring inbound event with no registered handler"
                );

                Ok(IngestionOutcome::IgnoredUnknownType {
                    event_id,
                    event_type: notification.event_type,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

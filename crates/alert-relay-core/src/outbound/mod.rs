//! # Outbound Alert Notification
//!
//! Composes versioned notification payloads from alert batches and fans them
//! out to tenant-registered endpoints with HMAC signing, bounded timeouts,
//! and exponential-backoff retries.
//!
//! Composition is deterministic and happens once per notification cycle:
//! the serialized bytes are shared read-only across every endpoint task and
//! every retry attempt, so a retried delivery reproduces the exact signature
//! of the first attempt.

use crate::signature::WebhookSecret;
use crate::{EndpointId, TenantId, Timestamp, ValidationError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub mod delivery;
pub mod fanout;
pub mod retry;

/// Fixed event tag carried by every alert notification payload.
pub const EVENT_ALERT_NOTIFICATION: &str = "alert.notification";

// ============================================================================
// Alert Types
// ============================================================================

/// Severity of a single alert, as counted into the payload summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// String tag as emitted in payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One alert raised against a monitored server.
///
/// Supplied by the alert source (out of scope); the composer carries items
/// through in the order received without re-sorting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// Which check raised the alert, e.g. `queue_depth` or `memory_watermark`.
    pub check: String,
    pub message: String,
    pub severity: Severity,
    pub raised_at: Timestamp,
}

/// Tenant reference embedded in outbound payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRef {
    pub id: TenantId,
    pub name: String,
}

/// Monitored-server reference embedded in outbound payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub name: String,
}

/// Who the notification is about: owning tenant plus monitored server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub tenant: TenantRef,
    pub source: SourceRef,
}

// ============================================================================
// Endpoints
// ============================================================================

/// Payload schema version understood by an endpoint.
///
/// Only `v1` exists today; the enum keeps version negotiation a closed set
/// rather than a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadVersion {
    V1,
}

impl PayloadVersion {
    /// Wire tag for the version header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
        }
    }

    /// Parse a stored version tag.
    pub fn parse(tag: &str) -> Result<Self, ValidationError> {
        match tag {
            "v1" => Ok(Self::V1),
            other => Err(ValidationError::InvalidFormat {
                field: "payload_version".to_string(),
                message: format!("unsupported payload version '{}'", other),
            }),
        }
    }
}

impl Default for PayloadVersion {
    fn default() -> Self {
        Self::V1
    }
}

impl fmt::Display for PayloadVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of receiver behind an endpoint URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Generic webhook receiving the full JSON envelope, optionally signed.
    Generic,
    /// Chat-platform incoming webhook receiving a text rendering; never signed.
    Chat,
}

/// A tenant-registered notification endpoint.
///
/// Lifecycle is owned by the external management layer; the engine reads
/// enabled endpoints at dispatch time and never mutates them.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub url: Url,
    pub kind: EndpointKind,
    pub secret: Option<WebhookSecret>,
    pub enabled: bool,
    pub payload_version: PayloadVersion,
}

// ============================================================================
// Payload Composition
// ============================================================================

/// Counts of alerts by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeveritySummary {
    /// Count a batch of alerts.
    pub fn from_items(items: &[Alert]) -> Self {
        let mut summary = Self {
            total: items.len(),
            critical: 0,
            warning: 0,
            info: 0,
        };
        for item in items {
            match item.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }
}

/// The versioned notification envelope delivered to generic endpoints.
///
/// Field declaration order is the wire order; serializing the same payload
/// twice yields byte-identical JSON, which is what keeps retry signatures
/// stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub version: PayloadVersion,
    pub event: String,
    pub timestamp: String,
    pub tenant: TenantRef,
    pub source: SourceRef,
    pub items: Vec<Alert>,
    pub summary: SeveritySummary,
}

/// Build the notification envelope for one alert batch.
///
/// Deterministic: identical `items`, `ctx`, and `composed_at` produce an
/// identical payload. Item ordering is preserved as received. The cycle
/// timestamp is a parameter, not sampled here, so the caller controls when
/// "the same composition" means the same bytes.
pub fn compose(items: Vec<Alert>, ctx: &SourceContext, composed_at: Timestamp) -> OutboundPayload {
    let summary = SeveritySummary::from_items(&items);
    OutboundPayload {
        version: PayloadVersion::V1,
        event: EVENT_ALERT_NOTIFICATION.to_string(),
        timestamp: composed_at.to_rfc3339(),
        tenant: ctx.tenant.clone(),
        source: ctx.source.clone(),
        items,
        summary,
    }
}

/// Failure to serialize a composed payload.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A payload serialized exactly once for a delivery cycle.
///
/// Holds the JSON envelope bytes for generic endpoints and the text
/// rendering for chat endpoints. Both are immutable after composition and
/// shared read-only across all concurrent endpoint tasks and their retries.
#[derive(Debug, Clone)]
pub struct ComposedPayload {
    payload: OutboundPayload,
    body: Bytes,
    chat_body: Bytes,
}

impl ComposedPayload {
    /// Compose and serialize one notification cycle.
    pub fn compose(
        items: Vec<Alert>,
        ctx: &SourceContext,
        composed_at: Timestamp,
    ) -> Result<Self, ComposeError> {
        let payload = compose(items, ctx, composed_at);
        let body = Bytes::from(serde_json::to_vec(&payload)?);
        let chat_body = Bytes::from(serde_json::to_vec(&serde_json::json!({
            "text": render_chat_text(&payload),
        }))?);

        Ok(Self {
            payload,
            body,
            chat_body,
        })
    }

    /// The structured envelope.
    pub fn payload(&self) -> &OutboundPayload {
        &self.payload
    }

    /// The serialized envelope bytes (cheap to clone, shared buffer).
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    /// The serialized chat message bytes.
    pub fn chat_body(&self) -> Bytes {
        self.chat_body.clone()
    }

    /// The cycle timestamp carried in the envelope.
    pub fn timestamp(&self) -> &str {
        &self.payload.timestamp
    }
}

/// Render the compact text form sent to chat-platform webhooks.
///
/// One summary line followed by one line per alert, in item order.
pub fn render_chat_text(payload: &OutboundPayload) -> String {
    let s = &payload.summary;
    let mut text = format!(
        "{} alert(s) on {} ({} critical, {} warning, {} info)",
        s.total, payload.source.name, s.critical, s.warning, s.info
    );
    for item in &payload.items {
        text.push_str(&format!(
            "\n[{}] {}: {}",
            item.severity.as_str().to_uppercase(),
            item.check,
            item.message
        ));
    }
    text
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

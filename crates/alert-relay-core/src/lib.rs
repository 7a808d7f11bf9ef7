//! # Alert-Relay Core
//!
//! Core event-delivery engine for the alert-relay webhook subsystem.
//!
//! This crate contains the two symmetric halves of the webhook engine:
//!
//! - **Inbound**: verifying, deduplicating, and dispatching signed billing
//!   events received from the payment processor ([`inbound`]).
//! - **Outbound**: composing alert notification payloads and delivering them
//!   to tenant-registered endpoints with signing, bounded timeouts, and
//!   exponential-backoff retries ([`outbound`]).
//!
//! ## Architecture
//!
//! The engine depends only on trait abstractions: persistence
//! ([`inbound::EventStore`], [`inbound::handlers::SubscriptionStore`]) and
//! HTTP transport ([`outbound::delivery::WebhookTransport`]) are injected at
//! runtime, so every failure path resolves to a typed result value and the
//! whole engine is testable without a network.
//!
//! ## Usage
//!
//! ```rust
//! use alert_relay_core::{NotificationId, TenantId, Timestamp};
//!
//! let cycle = NotificationId::new();
//! let tenant = TenantId::new();
//! let now = Timestamp::now();
//! assert_ne!(cycle.to_string(), tenant.to_string());
//! let _ = now.to_rfc3339();
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod inbound;
pub mod outbound;
pub mod signature;

// Re-export commonly used types
pub use ulid::Ulid;
pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier for a tenant (workspace) that owns notification endpoints.
///
/// Assigned by the external management layer; the core only carries it
/// through payloads and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Generate a new random tenant ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s).map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(id))
    }
}

/// Identifier for a tenant-registered notification endpoint.
///
/// Endpoint lifecycle (create/update/delete) belongs to the external CRUD
/// layer; the core reads endpoints at dispatch time and keys delivery
/// results by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Generate a new random endpoint ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EndpointId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s).map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(id))
    }
}

/// Unique identifier for one outbound notification cycle.
///
/// Uses ULID for lexicographic sorting in logs; generated when a fan-out
/// begins and attached to every delivery result and log line of that cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Ulid);

impl NotificationId {
    /// Generate a new unique notification ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NotificationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "ULID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// UTC timestamp used across inbound events and outbound payloads.
///
/// Serializes as RFC 3339 with second precision so composed payloads are
/// byte-stable across re-serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing datetime.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Render as RFC 3339 (ISO-8601) with `Z` suffix.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

// ============================================================================
// Shared Error Types
// ============================================================================

/// Errors from parsing identifier strings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Field-level validation failures for externally supplied values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid field format: {field} - {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field too long: {field} (max {max_length})")]
    TooLong { field: String, max_length: usize },
}

/// Errors surfaced by the external persistence collaborators.
///
/// The core never talks to a database directly; stores are injected behind
/// traits and report failures through this type so the ingestion pipeline
/// can classify them for the caller.
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("Store operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Store not available: {message}")]
    Unavailable { message: String },

    #[error("Record not found: {key}")]
    NotFound { key: String },
}

impl StateStoreError {
    /// Check whether the failure is transient and worth a redelivery.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OperationFailed { .. } => true,
            Self::Unavailable { .. } => true,
            Self::NotFound { .. } => false,
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

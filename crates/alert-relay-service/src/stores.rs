//! In-memory implementations of the engine's persistence seams.
//!
//! These back development, testing, and single-node deployments; a
//! database-backed deployment swaps them out behind the same traits. The
//! event store's upsert holds one write lock across its read-modify-write,
//! which makes it atomic at the id key as the dedup contract requires.

use alert_relay_core::inbound::handlers::{
    ConfirmationSink, SideEffectError, StatusTransition, SubscriptionRecord, SubscriptionStore,
};
use alert_relay_core::inbound::{EventStore, InboundEvent, ProviderEventId};
use alert_relay_core::outbound::Endpoint;
use alert_relay_core::{StateStoreError, TenantId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

// ============================================================================
// Endpoint Directory
// ============================================================================

/// Read side of endpoint management: which endpoints belong to a tenant.
///
/// Endpoint CRUD lives in the external management layer; the engine only
/// needs this lookup at dispatch time.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    /// All endpoints registered for a tenant, enabled or not.
    async fn list_for_tenant(&self, tenant: TenantId) -> Result<Vec<Endpoint>, StateStoreError>;
}

/// In-memory endpoint directory.
#[derive(Default)]
pub struct InMemoryEndpointDirectory {
    endpoints: RwLock<HashMap<TenantId, Vec<Endpoint>>>,
}

impl InMemoryEndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint for a tenant.
    pub fn register(&self, tenant: TenantId, endpoint: Endpoint) {
        self.endpoints
            .write()
            .unwrap()
            .entry(tenant)
            .or_default()
            .push(endpoint);
    }
}

#[async_trait]
impl EndpointDirectory for InMemoryEndpointDirectory {
    async fn list_for_tenant(&self, tenant: TenantId) -> Result<Vec<Endpoint>, StateStoreError> {
        Ok(self
            .endpoints
            .read()
            .unwrap()
            .get(&tenant)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Event Store
// ============================================================================

/// In-memory inbound event store keyed by provider event id.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<ProviderEventId, InboundEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored event (used by tests and the readiness probe).
    pub fn get(&self, id: &ProviderEventId) -> Option<InboundEvent> {
        self.events.read().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn upsert_by_provider_id(
        &self,
        event: InboundEvent,
    ) -> Result<InboundEvent, StateStoreError> {
        // One write lock across the read-modify-write: atomic at the id key.
        let mut events = self.events.write().unwrap();
        let stored = match events.get_mut(&event.id) {
            Some(existing) => {
                existing.event_type = event.event_type;
                existing.payload = event.payload;
                existing.received_at = event.received_at;
                existing.processed = false;
                existing.clone()
            }
            None => {
                events.insert(event.id.clone(), event.clone());
                event
            }
        };
        Ok(stored)
    }

    async fn mark_processed(&self, id: &ProviderEventId) -> Result<(), StateStoreError> {
        let mut events = self.events.write().unwrap();
        match events.get_mut(id) {
            Some(event) => {
                event.processed = true;
                Ok(())
            }
            None => Err(StateStoreError::NotFound {
                key: id.to_string(),
            }),
        }
    }
}

// ============================================================================
// Subscription Store
// ============================================================================

/// In-memory subscription state store.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    records: RwLock<HashMap<String, SubscriptionRecord>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, StateStoreError> {
        Ok(self.records.read().unwrap().get(subscription_id).cloned())
    }

    async fn put(&self, record: SubscriptionRecord) -> Result<(), StateStoreError> {
        self.records
            .write()
            .unwrap()
            .insert(record.subscription_id.clone(), record);
        Ok(())
    }
}

// ============================================================================
// Confirmation Sink
// ============================================================================

/// Confirmation sink that records transitions to the log.
///
/// Production deployments replace this with the messaging integration; the
/// log line keeps the transition visible either way.
#[derive(Default)]
pub struct LoggingConfirmationSink;

impl LoggingConfirmationSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfirmationSink for LoggingConfirmationSink {
    async fn subscription_status_changed(
        &self,
        subscription_id: &str,
        transition: &StatusTransition,
    ) -> Result<(), SideEffectError> {
        info!(
            subscription_id = %subscription_id,
            from = ?transition.from,
            to = %transition.to,
            "Subscription status confirmation"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "stores_tests.rs"]
mod tests;

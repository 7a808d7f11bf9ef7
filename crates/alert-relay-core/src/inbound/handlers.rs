//! Event handlers that reconcile subscription and payment state.
//!
//! Each processor event type maps to one handler in a static registry.
//! Handlers are pure mappings `(event, current state) -> new state` plus the
//! side effect of persisting that state. Because the processor delivers
//! at-least-once and redeliveries reset the dedup flag, every handler must
//! be idempotent: externally visible side effects (confirmation messages)
//! are gated on a status *transition* having actually occurred, never on
//! mere handler invocation.

use crate::{StateStoreError, Timestamp, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Subscription State
// ============================================================================

/// Billing status of a tenant subscription, mirrored from processor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// String tag as carried in processor payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// Parse a processor status tag.
    pub fn parse(tag: &str) -> Result<Self, ValidationError> {
        match tag {
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                message: format!("unknown subscription status '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscription record in the external state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Processor-assigned subscription identifier.
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub plan: String,
    pub updated_at: Timestamp,
}

/// A status change that actually happened during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    /// Prior status; `None` when the record did not exist yet.
    pub from: Option<SubscriptionStatus>,
    pub to: SubscriptionStatus,
}

// ============================================================================
// Collaborator Seams
// ============================================================================

/// External subscription state that handlers read and mutate.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Look up the current record for a subscription, if any.
    async fn get(&self, subscription_id: &str)
        -> Result<Option<SubscriptionRecord>, StateStoreError>;

    /// Persist the reconciled record, replacing any prior state.
    async fn put(&self, record: SubscriptionRecord) -> Result<(), StateStoreError>;
}

/// Externally visible side effects emitted on state transitions.
///
/// Implementations send confirmation messages, kick off entitlement
/// refreshes, and the like. The registry only invokes a sink when a
/// transition occurred, which is what keeps redundant and redelivered
/// events from producing duplicate messages.
#[async_trait]
pub trait ConfirmationSink: Send + Sync {
    /// Notify that a subscription moved to a new status.
    async fn subscription_status_changed(
        &self,
        subscription_id: &str,
        transition: &StatusTransition,
    ) -> Result<(), SideEffectError>;
}

/// Failure while emitting a transition side effect.
#[derive(Debug, thiserror::Error)]
pub enum SideEffectError {
    #[error("Confirmation delivery failed: {message}")]
    Failed { message: String },
}

// ============================================================================
// Billing Events
// ============================================================================

/// The processor event kinds this system reconciles, as a closed sum type.
///
/// Dispatch is an exhaustive match over these variants; event types outside
/// the set land in [`BillingEvent::Unhandled`] and are acknowledged without
/// side effects rather than falling into an unchecked default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    SubscriptionActivated {
        subscription_id: String,
        plan: String,
    },
    SubscriptionUpdated {
        subscription_id: String,
        plan: String,
        status: SubscriptionStatus,
    },
    SubscriptionCanceled {
        subscription_id: String,
    },
    PaymentSucceeded {
        subscription_id: String,
        invoice_id: String,
        amount_cents: i64,
    },
    PaymentFailed {
        subscription_id: String,
        invoice_id: String,
        amount_cents: i64,
    },
    Unhandled {
        event_type: String,
    },
}

impl BillingEvent {
    /// Map a processor event type tag plus data object onto a variant.
    ///
    /// Known event types with missing or mistyped fields are an error;
    /// unknown event types are not, they become [`BillingEvent::Unhandled`].
    pub fn from_parts(
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<Self, ValidationError> {
        match event_type {
            "customer.subscription.created" => Ok(Self::SubscriptionActivated {
                subscription_id: required_str(data, "subscription_id")?,
                plan: required_str(data, "plan")?,
            }),
            "customer.subscription.updated" => Ok(Self::SubscriptionUpdated {
                subscription_id: required_str(data, "subscription_id")?,
                plan: required_str(data, "plan")?,
                status: SubscriptionStatus::parse(&required_str(data, "status")?)?,
            }),
            "customer.subscription.deleted" => Ok(Self::SubscriptionCanceled {
                subscription_id: required_str(data, "subscription_id")?,
            }),
            "invoice.payment_succeeded" => Ok(Self::PaymentSucceeded {
                subscription_id: required_str(data, "subscription_id")?,
                invoice_id: required_str(data, "invoice_id")?,
                amount_cents: required_i64(data, "amount_cents")?,
            }),
            "invoice.payment_failed" => Ok(Self::PaymentFailed {
                subscription_id: required_str(data, "subscription_id")?,
                invoice_id: required_str(data, "invoice_id")?,
                amount_cents: required_i64(data, "amount_cents")?,
            }),
            other => Ok(Self::Unhandled {
                event_type: other.to_string(),
            }),
        }
    }
}

fn required_str(data: &serde_json::Value, field: &str) -> Result<String, ValidationError> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ValidationError::Required {
            field: field.to_string(),
        })
}

fn required_i64(data: &serde_json::Value, field: &str) -> Result<i64, ValidationError> {
    data.get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ValidationError::Required {
            field: field.to_string(),
        })
}

// ============================================================================
// Error Types
// ============================================================================

/// Failures while dispatching an event to its handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Malformed event data: {0}")]
    Malformed(#[from] ValidationError),

    #[error("Subscription store failure: {0}")]
    Store(#[from] StateStoreError),

    #[error("Side effect failure: {0}")]
    SideEffect(#[from] SideEffectError),
}

impl HandlerError {
    /// Check whether a processor redelivery is worth attempting.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Malformed(_) => false,
            Self::Store(e) => e.is_transient(),
            Self::SideEffect(_) => true,
        }
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran; `transition_occurred` reports whether external state
    /// actually changed (and therefore whether a side effect was emitted).
    Reconciled { transition_occurred: bool },

    /// No handler registered for this event type.
    Ignored,
}

// ============================================================================
// Handler Registry
// ============================================================================

/// Static handler table over the known billing event kinds.
///
/// There is no dynamic handler discovery: the mapping from event kind to
/// reconciliation logic is the exhaustive match in [`Self::dispatch`].
pub struct HandlerRegistry {
    subscriptions: Arc<dyn SubscriptionStore>,
    confirmations: Arc<dyn ConfirmationSink>,
}

impl HandlerRegistry {
    /// Create a registry over the injected collaborators.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        confirmations: Arc<dyn ConfirmationSink>,
    ) -> Self {
        Self {
            subscriptions,
            confirmations,
        }
    }

    /// Parse and dispatch one event to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the event data is malformed for a known
    /// type, or when the store or sink fails. Unknown event types are not an
    /// error; they return [`DispatchOutcome::Ignored`].
    pub async fn dispatch(
        &self,
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<DispatchOutcome, HandlerError> {
        let event = BillingEvent::from_parts(event_type, data)?;

        match event {
            BillingEvent::SubscriptionActivated {
                subscription_id,
                plan,
            } => {
                self.reconcile(&subscription_id, SubscriptionStatus::Active, Some(plan))
                    .await
            }
            BillingEvent::SubscriptionUpdated {
                subscription_id,
                plan,
                status,
            } => self.reconcile(&subscription_id, status, Some(plan)).await,
            BillingEvent::SubscriptionCanceled { subscription_id } => {
                self.reconcile(&subscription_id, SubscriptionStatus::Canceled, None)
                    .await
            }
            BillingEvent::PaymentSucceeded {
                subscription_id,
                invoice_id,
                amount_cents,
            } => {
                debug!(
                    subscription_id = %subscription_id,
                    invoice_id = %invoice_id,
                    amount_cents,
                    "Payment succeeded"
                );
                // A settled invoice means the subscription is in good
                // standing again, whatever state the dunning cycle left it in.
                self.reconcile(&subscription_id, SubscriptionStatus::Active, None)
                    .await
            }
            BillingEvent::PaymentFailed {
                subscription_id,
                invoice_id,
                amount_cents,
            } => {
                warn!(
                    subscription_id = %subscription_id,
                    invoice_id = %invoice_id,
                    amount_cents,
                    "Payment failed"
                );
                self.reconcile(&subscription_id, SubscriptionStatus::PastDue, None)
                    .await
            }
            BillingEvent::Unhandled { event_type } => {
                debug!(event_type = %event_type, "No handler registered for event type");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    /// Converge the stored record toward the status described by the event.
    ///
    /// The side effect (confirmation message) fires only when the stored
    /// status actually changed. Applying the same event twice, or two
    /// redundant events describing the same target state, writes the same
    /// record and emits nothing the second time.
    async fn reconcile(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        plan: Option<String>,
    ) -> Result<DispatchOutcome, HandlerError> {
        let current = self.subscriptions.get(subscription_id).await?;

        let prior_status = current.as_ref().map(|r| r.status);
        let plan = plan
            .or_else(|| current.as_ref().map(|r| r.plan.clone()))
            .unwrap_or_default();

        let transition = if prior_status != Some(status) {
            Some(StatusTransition {
                from: prior_status,
                to: status,
            })
        } else {
            None
        };

        self.subscriptions
            .put(SubscriptionRecord {
                subscription_id: subscription_id.to_string(),
                status,
                plan,
                updated_at: Timestamp::now(),
            })
            .await?;

        if let Some(transition) = &transition {
            info!(
                subscription_id = %subscription_id,
                from = ?transition.from,
                to = %transition.to,
                "Subscription status transitioned"
            );

            self.confirmations
                .subscription_status_changed(subscription_id, transition)
                .await?;
        }

        Ok(DispatchOutcome::Reconciled {
            transition_occurred: transition.is_some(),
        })
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;

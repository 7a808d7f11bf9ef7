//! # Fan-out Coordinator
//!
//! Composes one payload per notification cycle and pushes it to every
//! enabled endpoint concurrently. Each endpoint's delivery — including its
//! whole retry chain — runs in its own task with its own failure boundary:
//! a slow, failing, or panicking endpoint never delays or aborts the
//! others. All outcomes are collected into one report keyed by endpoint id.

use super::delivery::{DeliveryEngine, DeliveryOutcome, DeliveryResult};
use super::{Alert, ComposeError, ComposedPayload, Endpoint, SourceContext};
use crate::NotificationId;
use crate::Timestamp;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Notification Report
// ============================================================================

/// Aggregated outcome of one notification cycle across all endpoints.
#[derive(Debug)]
pub struct NotificationReport {
    pub notification_id: NotificationId,
    /// Per-endpoint results, one entry per enabled endpoint dispatched to.
    pub results: Vec<DeliveryResult>,
}

impl NotificationReport {
    /// Count of endpoints that accepted the payload.
    pub fn delivered_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_success()).count()
    }

    /// Count of endpoints whose chain ended in failure.
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.delivered_count()
    }

    /// Check if every dispatched endpoint accepted the payload.
    pub fn is_complete_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_success())
    }

    /// Check if this cycle had no enabled endpoints to dispatch to.
    pub fn is_no_op(&self) -> bool {
        self.results.is_empty()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Fans one composed payload out to all enabled endpoints of a tenant.
pub struct FanOutCoordinator {
    engine: Arc<DeliveryEngine>,
}

impl FanOutCoordinator {
    /// Create a coordinator over a shared delivery engine.
    pub fn new(engine: Arc<DeliveryEngine>) -> Self {
        Self { engine }
    }

    /// Compose one payload and deliver it to every enabled endpoint.
    ///
    /// The payload (and its chat rendering) is composed and serialized
    /// exactly once; the immutable bytes are the only state shared across
    /// the parallel delivery boundary. Deliveries are spawned concurrently
    /// and each owns its retry chain; per-endpoint failures — including a
    /// panicked task — are converted into failure results rather than
    /// propagated.
    ///
    /// # Errors
    ///
    /// Only composition/serialization can fail here; delivery failures are
    /// reported inside the [`NotificationReport`].
    pub async fn notify(
        &self,
        endpoints: &[Endpoint],
        items: Vec<Alert>,
        ctx: &SourceContext,
    ) -> Result<NotificationReport, ComposeError> {
        let notification_id = NotificationId::new();

        let enabled: Vec<Endpoint> = endpoints.iter().filter(|e| e.enabled).cloned().collect();

        if enabled.is_empty() {
            info!(
                notification_id = %notification_id,
                tenant_id = %ctx.tenant.id,
                "No enabled endpoints; skipping notification cycle"
            );
            return Ok(NotificationReport {
                notification_id,
                results: Vec::new(),
            });
        }

        let payload = Arc::new(ComposedPayload::compose(items, ctx, Timestamp::now())?);

        info!(
            notification_id = %notification_id,
            tenant_id = %ctx.tenant.id,
            source = %ctx.source.name,
            endpoints = enabled.len(),
            alerts = payload.payload().summary.total,
            "Starting notification fan-out"
        );

        // Spawn every chain up front so they run concurrently; collect in
        // spawn order afterwards. Awaiting in order does not serialize the
        // work, only the bookkeeping.
        let handles: Vec<_> = enabled
            .into_iter()
            .map(|endpoint| {
                let engine = self.engine.clone();
                let payload = payload.clone();
                let endpoint_id = endpoint.id;
                let handle =
                    tokio::spawn(async move { engine.deliver(&endpoint, &payload).await });
                (endpoint_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (endpoint_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    // Isolation boundary: a dead task is that endpoint's
                    // failure, nobody else's.
                    error!(
                        notification_id = %notification_id,
                        endpoint_id = %endpoint_id,
                        error = %join_error,
                        "Delivery task died"
                    );
                    DeliveryResult {
                        endpoint_id,
                        outcome: DeliveryOutcome::Aborted {
                            reason: join_error.to_string(),
                        },
                        attempts: 0,
                    }
                }
            };
            results.push(result);
        }

        let report = NotificationReport {
            notification_id,
            results,
        };

        info!(
            notification_id = %notification_id,
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            "Notification fan-out finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;

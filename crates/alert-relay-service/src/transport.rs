//! Reqwest-backed implementation of the outbound webhook transport.

use alert_relay_core::outbound::delivery::{
    DeliveryRequest, TransportError, TransportResponse, WebhookTransport,
};
use async_trait::async_trait;
use std::time::Duration;

/// HTTP transport for outbound deliveries.
///
/// Owns the per-attempt timeout: the engine treats an elapsed timeout
/// identically to a network error, and aborting the timed-out request
/// cancels only that attempt.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error when the TLS backend cannot be
    /// initialized; this is a startup fault, not a delivery outcome.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: DeliveryRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.post(request.url).body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        match builder.send().await {
            Ok(response) => Ok(TransportResponse {
                status: response.status().as_u16(),
            }),
            Err(error) if error.is_timeout() => Err(TransportError::Timeout),
            Err(error) if error.is_connect() => Err(TransportError::Connect {
                message: error.to_string(),
            }),
            Err(error) => Err(TransportError::Io {
                message: error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

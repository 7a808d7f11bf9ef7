//! HMAC-SHA256 payload signing and verification.
//!
//! Used identically by both halves of the engine: inbound requests from the
//! payment processor are verified against the platform secret, and outbound
//! deliveries are signed with the per-endpoint secret. Verification uses
//! constant-time comparison to prevent timing-based secret recovery.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by signature header values, e.g. `sha256=<hex>`.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// A shared webhook secret.
///
/// Thin wrapper whose only job is keeping the raw value out of `Debug`
/// output and log lines.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    /// Wrap a raw secret value (not Base64 or hex-encoded).
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the raw bytes for HMAC key material.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WebhookSecret").field(&"<REDACTED>").finish()
    }
}

impl From<String> for WebhookSecret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for WebhookSecret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Compute the hex HMAC-SHA256 digest of `payload` under `secret`.
///
/// Deterministic: the same payload bytes and secret always produce the same
/// digest, which is what lets a retried delivery carry the same signature.
pub fn sign_payload(payload: &[u8], secret: &WebhookSecret) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Produce the outbound signature header value, `sha256=<hex>`.
pub fn signature_header_value(payload: &[u8], secret: &WebhookSecret) -> String {
    format!("{}{}", SIGNATURE_PREFIX, sign_payload(payload, secret))
}

/// Verify `signature` against the HMAC-SHA256 digest of `payload`.
///
/// Accepts either a bare hex digest or a `sha256=`-prefixed value. A
/// malformed (non-hex) signature verifies `false` rather than erroring;
/// callers only ever need the boolean.
///
/// The comparison runs in constant time over the digest bytes.
pub fn verify_payload(payload: &[u8], signature: &str, secret: &WebhookSecret) -> bool {
    let hex_part = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);

    let provided = match hex::decode(hex_part) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    let expected = mac.finalize().into_bytes().to_vec();

    // Length check is not secret-dependent and safe in variable time.
    if provided.len() != expected.len() {
        return false;
    }

    provided.as_slice().ct_eq(expected.as_slice()).into()
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;

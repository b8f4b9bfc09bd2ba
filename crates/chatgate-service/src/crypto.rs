//! Webhook signature verification.
//!
//! When a webhook secret is configured, relayed processor notifications must carry
//! `X-Webhook-Signature: sha256=<hex HMAC-SHA256 of the raw body>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the notification signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Error type for signature checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No signature header was sent.
    #[error("missing signature")]
    Missing,

    /// The signature does not match the body.
    #[error("signature mismatch")]
    Mismatch,

    /// The secret cannot be used as an HMAC key.
    #[error("invalid signing key")]
    InvalidKey,
}

/// Compute HMAC-SHA256 of `message` and return it hex-encoded (64 characters).
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the key is rejected by the HMAC implementation.
pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` (with or without a `sha256=` prefix) against `body`.
///
/// # Errors
///
/// Returns `SignatureError::Missing` for an absent or empty header and
/// `SignatureError::Mismatch` when the digest differs.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let expected = hmac_sha256_hex(secret, body)?;
    if constant_time_eq(&expected, &signature.to_ascii_lowercase()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

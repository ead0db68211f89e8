//! Webhook signature verification and header extraction.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Scheme tag GitHub prepends to `X-Hub-Signature-256` values.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Header carrying the HMAC signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the delivery id.
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Verify a GitHub webhook signature using HMAC-SHA256.
///
/// # Arguments
/// * `body` - Raw webhook body bytes, exactly as received
/// * `signature` - `X-Hub-Signature-256` header value (`sha256=<hex>`)
/// * `secret` - Webhook signing secret
///
/// # Returns
/// `true` if signature is valid, `false` otherwise. A value without the
/// `sha256=` tag is rejected before any hashing happens.
#[must_use]
pub fn verify_webhook_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Some(received) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let Some(expected) = hex_digest(secret, body) else {
        return false;
    };

    // Constant-time comparison to prevent timing attacks
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

/// Produce the `X-Hub-Signature-256` value GitHub would send for `body`.
#[must_use]
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    format!(
        "{SIGNATURE_PREFIX}{}",
        hex_digest(secret, body).unwrap_or_default()
    )
}

/// Lowercase hex HMAC-SHA256 of `body`.
fn hex_digest(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Parsed webhook headers
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    /// Unique delivery ID
    pub delivery_id: Option<String>,
    /// Event type
    pub event_type: Option<String>,
    /// HMAC signature
    pub signature: Option<String>,
}

impl WebhookHeaders {
    /// Parse headers from a request. Empty values count as absent.
    #[must_use]
    pub fn from_header_map(get_header: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| get_header(name).filter(|v| !v.is_empty());
        Self {
            delivery_id: get(DELIVERY_HEADER),
            event_type: get(EVENT_HEADER),
            signature: get(SIGNATURE_HEADER),
        }
    }
}

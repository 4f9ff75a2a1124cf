//! HMAC-SHA256 payload signatures and webhook secrets.
//!
//! The signature covers the exact request body bytes and is sent as
//! `X-Webhook-Signature: sha256=<hex>`, the same shape GitHub uses for
//! `X-Hub-Signature-256`, so existing receiver libraries can verify it.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const EVENT_HEADER: &str = "x-webhook-event";
pub const WEBHOOK_ID_HEADER: &str = "x-webhook-id";
pub const DELIVERY_HEADER: &str = "x-webhook-delivery";

const SECRET_PREFIX: &str = "whsec_";

/// Generate a fresh signing secret: `whsec_` followed by 32 random bytes in hex.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

/// Compute the header value for `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Receiver-side check of a `sha256=<hex>` header value.
///
/// Uses the MAC's constant-time comparison.
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> Result<(), String> {
    let sig_hex = header_value
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed signature header".to_string())?;

    let expected = hex::decode(sig_hex).map_err(|_| "signature is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

//! Signed webhook delivery.
//!
//! Callbacks are a plain HTTPS POST with an HMAC-SHA256 signature over the
//! exact body bytes, so receivers can verify both origin and integrity.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

/// Header carrying the base64 HMAC-SHA256 signature of the body.
pub const SIGNATURE_HEADER: &str = "x-osb-signature";

/// Webhook payload. Field order is the wire order; receivers verify the
/// signature against the exact bytes.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub state: String,
    pub description: String,
}

impl WebhookPayload {
    /// The payload sent when a service instance becomes available.
    pub fn service_created() -> Self {
        Self {
            state: "succeeded".to_string(),
            description: "available".to_string(),
        }
    }
}

/// Sign a payload with the shared secret: base64(HMAC-SHA256(secret, body)).
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Webhook HTTP client.
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// POST the signed payload. Returns the response status; transport
    /// failures surface as errors.
    pub async fn deliver(
        &self,
        url: &str,
        secret: &str,
        payload: &WebhookPayload,
    ) -> Result<reqwest::StatusCode, reqwest::Error> {
        let body = serde_json::to_vec(payload).expect("webhook payload serializes");
        let signature = sign_payload(secret, &body);
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;
        Ok(response.status())
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a response status counts as delivered.
pub fn is_delivered(status: reqwest::StatusCode) -> bool {
    let code = status.as_u16();
    (200..400).contains(&code)
}

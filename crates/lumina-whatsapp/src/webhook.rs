// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API webhook handling: signature verification, the
//! subscription handshake, and payload parsing into [`WhatsAppInbound`].
//!
//! Signature verification is a hard precondition. A missing, malformed, or
//! wrong `X-Hub-Signature-256` rejects the request before the body is parsed.

use hmac::{Hmac, Mac};
use lumina_core::LuminaError;
use lumina_core::types::WhatsAppInbound;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex hmac of the raw body>`.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check `X-Hub-Signature-256` against the raw request body.
///
/// The comparison runs in constant time via [`Mac::verify_slice`].
pub fn verify_signature(
    app_secret: &str,
    signature_header: Option<&str>,
    body: &[u8],
) -> Result<(), LuminaError> {
    if app_secret.is_empty() {
        return Err(LuminaError::Unauthorized(
            "webhook app secret is not configured".into(),
        ));
    }
    let header = signature_header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| LuminaError::Unauthorized("missing webhook signature".into()))?;
    let hex_sig = header
        .strip_prefix("sha256=")
        .ok_or_else(|| LuminaError::Unauthorized("unsupported signature scheme".into()))?;
    let expected = hex::decode(hex_sig)
        .map_err(|_| LuminaError::Unauthorized("malformed webhook signature".into()))?;

    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|e| LuminaError::Internal(format!("hmac key rejected: {e}")))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| LuminaError::Unauthorized("invalid webhook signature".into()))
}

/// Compute the header value for `body`. Used by tests and tooling.
pub fn sign(app_secret: &str, body: &[u8]) -> Result<String, LuminaError> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|e| LuminaError::Internal(format!("hmac key rejected: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Answer the `GET` verification handshake.
///
/// Returns the challenge to echo back when `mode` is `subscribe` and the
/// token matches, `None` otherwise.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge))
            if !expected_token.is_empty() && token == expected_token && !challenge.is_empty() =>
        {
            Some(challenge.to_string())
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<RawMessage>,
    /// Delivery receipts. Counted, otherwise ignored.
    #[serde(default)]
    statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    from: String,
    id: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<TextBody>,
    #[serde(default)]
    image: Option<Media>,
    #[serde(default)]
    audio: Option<Media>,
    #[serde(default)]
    video: Option<Media>,
    #[serde(default)]
    document: Option<Media>,
    #[serde(default)]
    sticker: Option<Media>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    id: String,
    #[serde(default)]
    caption: Option<String>,
}

/// Lift every client message out of a webhook body.
///
/// Status callbacks and message types carrying neither text nor media are
/// skipped. A body that is not a webhook payload is a `Validation` error.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<WhatsAppInbound>, LuminaError> {
    let payload: WebhookPayload = serde_json::from_slice(body)
        .map_err(|e| LuminaError::Validation(format!("malformed webhook payload: {e}")))?;

    let mut out = Vec::new();
    let mut receipts = 0usize;
    for change in payload.entry.into_iter().flat_map(|e| e.changes) {
        receipts += change.value.statuses.len();
        for raw in change.value.messages {
            let media = [raw.image, raw.audio, raw.video, raw.document, raw.sticker]
                .into_iter()
                .flatten()
                .next();
            let text = raw
                .text
                .map(|t| t.body)
                .or_else(|| media.as_ref().and_then(|m| m.caption.clone()));
            let media_id = media.map(|m| m.id);
            if text.is_none() && media_id.is_none() {
                debug!(kind = %raw.kind, message_id = %raw.id, "unsupported message type skipped");
                continue;
            }
            out.push(WhatsAppInbound {
                wa_id: raw.from,
                message_id: raw.id,
                text,
                media_id,
                timestamp: raw.timestamp.and_then(|t| t.parse().ok()),
            });
        }
    }
    if receipts > 0 {
        debug!(count = receipts, "status callbacks ignored");
    }
    Ok(out)
}

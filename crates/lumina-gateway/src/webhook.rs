// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API webhook routes.
//!
//! The POST body is only parsed after its HMAC signature checks out. Accepted
//! messages go onto an [`InboundQueue`] and are routed by background workers,
//! so Meta gets its 200 without waiting on the reply generator.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use dashmap::mapref::entry::Entry;
use lumina_core::{InboundEnvelope, InboundMessage, LuminaError};
use lumina_router::MessageRouter;
use lumina_whatsapp::webhook::{SIGNATURE_HEADER, parse_webhook, verify_signature};
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::server::GatewayState;

const SEEN_CAPACITY: usize = 10_000;
const SEEN_TTL: Duration = Duration::from_secs(3600);
const QUEUE_DEPTH: usize = 256;

/// Ordered hand-off from the webhook to the message router.
///
/// Messages are sharded by client reference, and each shard has one worker,
/// so a client's messages are routed one at a time in the order they were
/// accepted while other clients proceed in parallel.
#[derive(Clone)]
pub struct InboundQueue {
    shards: Arc<[mpsc::Sender<InboundMessage>]>,
}

impl InboundQueue {
    /// Spawn one routing worker per shard. Must be called inside a Tokio runtime.
    ///
    /// Workers exit once every clone of the queue is dropped and their
    /// backlog is routed.
    pub fn spawn(router: Arc<MessageRouter>, shards: usize) -> Self {
        let shards: Vec<_> = (0..shards.max(1))
            .map(|_| {
                let (tx, mut rx) = mpsc::channel::<InboundMessage>(QUEUE_DEPTH);
                let router = router.clone();
                tokio::spawn(async move {
                    while let Some(message) = rx.recv().await {
                        if let Err(e) = router.route(message).await {
                            log_route_failure(&e);
                        }
                    }
                });
                tx
            })
            .collect();
        Self {
            shards: shards.into(),
        }
    }

    /// Queue a message behind any earlier ones from the same client.
    pub async fn enqueue(&self, message: InboundMessage) -> Result<(), LuminaError> {
        let mut hasher = DefaultHasher::new();
        message.client_ref.hash(&mut hasher);
        let shard = (hasher.finish() % self.shards.len() as u64) as usize;
        self.shards[shard]
            .send(message)
            .await
            .map_err(|_| LuminaError::Internal("whatsapp routing worker stopped".into()))
    }
}

/// GET /webhooks/whatsapp
///
/// Subscription handshake: echoes `hub.challenge` when the token matches.
pub async fn verify_subscription(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(config) = &state.whatsapp else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match lumina_whatsapp::verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
        &config.verify_token,
    ) {
        Some(challenge) => (StatusCode::OK, challenge).into_response(),
        None => {
            tracing::warn!("whatsapp webhook verification failed");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhooks/whatsapp
pub async fn receive(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (Some(config), Some(queue)) = (&state.whatsapp, &state.whatsapp_queue) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = verify_signature(&config.app_secret, signature, &body) {
        lumina_prometheus::record_webhook_rejected("whatsapp");
        tracing::warn!(error = %e, "whatsapp webhook rejected");
        return Err(e.into());
    }

    let mut inbound = Vec::new();
    for message in parse_webhook(&body)? {
        if !first_delivery(&state, &message.message_id) {
            tracing::debug!(message_id = %message.message_id, "duplicate webhook delivery dropped");
            continue;
        }
        match InboundEnvelope::WhatsApp(message).into_inbound() {
            Ok(msg) => inbound.push(msg),
            Err(e) => tracing::warn!(error = %e, "whatsapp message skipped"),
        }
    }

    for msg in inbound {
        queue.enqueue(msg).await?;
    }
    Ok(StatusCode::OK.into_response())
}

fn log_route_failure(e: &LuminaError) {
    tracing::error!(error = %e, code = e.code(), "failed to route whatsapp message");
}

/// True the first time `message_id` is seen within [`SEEN_TTL`].
fn first_delivery(state: &GatewayState, message_id: &str) -> bool {
    let seen = &state.seen_messages;
    if seen.len() >= SEEN_CAPACITY {
        seen.retain(|_, at| at.elapsed() < SEEN_TTL);
    }
    match seen.entry(message_id.to_string()) {
        Entry::Occupied(mut slot) => {
            if slot.get().elapsed() < SEEN_TTL {
                return false;
            }
            slot.insert(Instant::now());
            true
        }
        Entry::Vacant(slot) => {
            slot.insert(Instant::now());
            true
        }
    }
}

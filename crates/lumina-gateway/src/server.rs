// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use dashmap::DashMap;
use lumina_core::LuminaError;
use lumina_router::MessageRouter;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::webhook::InboundQueue;
use crate::{handlers, operator, webhook};

const WHATSAPP_WORKERS: usize = 8;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Instant,
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Webhook secrets for the WhatsApp channel.
#[derive(Clone)]
pub struct WhatsAppWebhook {
    pub app_secret: String,
    pub verify_token: String,
}

impl std::fmt::Debug for WhatsAppWebhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppWebhook")
            .field("app_secret", &"[redacted]")
            .field("verify_token", &"[redacted]")
            .finish()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<MessageRouter>,
    pub auth: AuthConfig,
    pub health: HealthState,
    /// `None` disables the webhook routes (404).
    pub whatsapp: Option<WhatsAppWebhook>,
    /// Routing workers for accepted webhook messages; set with `whatsapp`.
    pub whatsapp_queue: Option<InboundQueue>,
    /// Upstream message ids already accepted, for dropping webhook retries.
    pub seen_messages: Arc<DashMap<String, Instant>>,
}

impl GatewayState {
    pub fn new(router: Arc<MessageRouter>, bearer_token: Option<String>) -> Self {
        Self {
            router,
            auth: AuthConfig { bearer_token },
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render: None,
            },
            whatsapp: None,
            whatsapp_queue: None,
            seen_messages: Arc::new(DashMap::new()),
        }
    }

    /// Enable the WhatsApp webhook and spawn its routing workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_whatsapp(mut self, webhook: WhatsAppWebhook) -> Self {
        self.whatsapp = Some(webhook);
        self.whatsapp_queue = Some(InboundQueue::spawn(self.router.clone(), WHATSAPP_WORKERS));
        self
    }

    pub fn with_metrics(mut self, render: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        self.health.prometheus_render = Some(render);
        self
    }
}

/// Gateway server configuration (mirrors `GatewayConfig` from lumina-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the full route table.
///
/// - GET /health, GET /metrics (public)
/// - GET/POST /webhooks/whatsapp (public, HMAC-verified)
/// - /v1/* chat, takeover, and escalation routes (bearer auth)
pub fn app(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .route(
            "/webhooks/whatsapp",
            get(webhook::verify_subscription).post(webhook::receive),
        )
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/chat", post(handlers::post_chat))
        .route("/v1/sessions", get(handlers::get_sessions))
        .route(
            "/v1/conversations/{id}/messages",
            get(handlers::get_messages),
        )
        .route(
            "/v1/conversations/{id}/session",
            get(operator::get_session),
        )
        .route(
            "/v1/conversations/{id}/takeover",
            post(operator::start_takeover),
        )
        .route("/v1/conversations/{id}/pause", post(operator::pause))
        .route("/v1/conversations/{id}/resume", post(operator::resume))
        .route("/v1/conversations/{id}/transfer", post(operator::transfer))
        .route("/v1/conversations/{id}/end", post(operator::end))
        .route("/v1/conversations/{id}/reply", post(operator::reply))
        .route("/v1/escalations", get(operator::list_escalations))
        .route("/v1/escalations/stats", get(operator::escalation_stats))
        .route("/v1/escalations/cleanup", post(operator::cleanup_escalations))
        .route("/v1/escalations/{id}", get(operator::get_escalation))
        .route("/v1/escalations/{id}/assign", post(operator::assign_escalation))
        .route(
            "/v1/escalations/{id}/resolve",
            post(operator::resolve_escalation),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), LuminaError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LuminaError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway server listening on {addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| LuminaError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway server stopped");
    Ok(())
}

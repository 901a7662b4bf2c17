// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health, metrics, web chat, and conversation read handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lumina_core::types::WebInbound;
use lumina_core::{InboundEnvelope, Message, SessionState, TakeoverSession};
use lumina_router::RouteOutcome;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text format; 404 when the exporter is disabled.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /v1/chat
///
/// Web chat inbound. The automated reply, if any, comes back in the body.
pub async fn post_chat(
    State(state): State<GatewayState>,
    Json(body): Json<WebInbound>,
) -> Result<Json<RouteOutcome>, ApiError> {
    let inbound = InboundEnvelope::Web(body).into_inbound()?;
    let outcome = state.router.route(inbound).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub state: Option<SessionState>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<TakeoverSession>,
}

/// GET /v1/sessions?state=active|paused
pub async fn get_sessions(
    State(state): State<GatewayState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.router.manager().list_sessions(query.state).await?;
    Ok(Json(SessionListResponse { sessions }))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

/// GET /v1/conversations/{id}/messages?limit=N
pub async fn get_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let store = state.router.store();
    store.get_conversation(&id).await?;
    let messages = store.list_messages(&id, query.limit).await?;
    Ok(Json(MessageListResponse {
        conversation_id: id,
        messages,
    }))
}

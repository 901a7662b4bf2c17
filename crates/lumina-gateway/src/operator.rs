// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator API: takeover session transitions and the escalation ledger.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use lumina_core::{
    ControlState, Escalation, EscalationFilter, EscalationStats, Message, Page, TakeoverSession,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Body for start, pause, and resume.
#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    pub agent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// The operator asking for the transfer.
    pub agent_id: String,
    pub to_agent: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndRequest {
    pub agent_id: String,
    pub resolution: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub agent_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: String,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub hours_threshold: u64,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub expired: usize,
}

/// Session plus the control state it implies.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: TakeoverSession,
    pub control: ControlState,
}

async fn with_control(
    state: &GatewayState,
    session: TakeoverSession,
) -> Result<Json<SessionResponse>, ApiError> {
    let control = state
        .router
        .manager()
        .control_state(&session.conversation_id)
        .await?;
    Ok(Json(SessionResponse { session, control }))
}

/// GET /v1/conversations/{id}/session
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.router.manager().get_session(&id).await?;
    with_control(&state, session).await
}

/// POST /v1/conversations/{id}/takeover
pub async fn start_takeover(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AgentRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.router.manager().start(&id, &body.agent_id).await?;
    with_control(&state, session).await
}

/// POST /v1/conversations/{id}/pause
pub async fn pause(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AgentRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.router.manager().pause(&id, &body.agent_id).await?;
    with_control(&state, session).await
}

/// POST /v1/conversations/{id}/resume
pub async fn resume(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AgentRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.router.manager().resume(&id, &body.agent_id).await?;
    with_control(&state, session).await
}

/// POST /v1/conversations/{id}/transfer
pub async fn transfer(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .router
        .manager()
        .transfer(&id, &body.agent_id, &body.to_agent, body.reason.as_deref())
        .await?;
    with_control(&state, session).await
}

/// POST /v1/conversations/{id}/end
///
/// Returns the session as it was when it ended, with the restored control.
pub async fn end(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<EndRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .router
        .manager()
        .end(&id, &body.agent_id, &body.resolution)
        .await?;
    with_control(&state, session).await
}

/// POST /v1/conversations/{id}/reply
pub async fn reply(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .router
        .manager()
        .reply(&id, &body.agent_id, &body.text)
        .await?;
    Ok(Json(message))
}

/// GET /v1/escalations
pub async fn list_escalations(
    State(state): State<GatewayState>,
    Query(filter): Query<EscalationFilter>,
) -> Result<Json<Page<Escalation>>, ApiError> {
    Ok(Json(state.router.ledger().list(filter).await?))
}

/// GET /v1/escalations/stats
pub async fn escalation_stats(
    State(state): State<GatewayState>,
) -> Result<Json<EscalationStats>, ApiError> {
    Ok(Json(state.router.ledger().stats().await?))
}

/// GET /v1/escalations/{id}
pub async fn get_escalation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Escalation>, ApiError> {
    Ok(Json(state.router.ledger().get(&id).await?))
}

/// POST /v1/escalations/{id}/assign
pub async fn assign_escalation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AgentRequest>,
) -> Result<Json<Escalation>, ApiError> {
    Ok(Json(
        state.router.ledger().assign(&id, &body.agent_id).await?,
    ))
}

/// POST /v1/escalations/{id}/resolve
pub async fn resolve_escalation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<Escalation>, ApiError> {
    Ok(Json(
        state.router.ledger().resolve(&id, &body.resolution).await?,
    ))
}

/// POST /v1/escalations/cleanup
pub async fn cleanup_escalations(
    State(state): State<GatewayState>,
    Json(body): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let expired = state
        .router
        .ledger()
        .expire_stale(body.hours_threshold)
        .await?;
    Ok(Json(CleanupResponse { expired }))
}

// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the router, escalation, takeover, and storage crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::LuminaError;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    Generator,
    Transport,
    Observability,
}

// --- Conversations ---

/// The channel a conversation arrives on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    Whatsapp,
}

/// Cached projection of the control state onto the conversation record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Escalated,
    Closed,
}

/// A customer thread on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub channel: Channel,
    /// Channel-specific client reference (web visitor id, WhatsApp `wa_id`).
    pub client_ref: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

// --- Messages ---

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Client,
    Automated,
    Human,
    /// Audit entries written by takeover transitions and the reaper.
    System,
}

/// An appended message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// Arrival sequence number, strictly increasing across the store.
    pub seq: i64,
    pub sender: SenderRole,
    /// Operator identity for `human` messages.
    pub author: Option<String>,
    pub content: String,
    pub media_ref: Option<String>,
    /// Generator confidence for `automated` messages.
    pub confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been appended yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender: SenderRole,
    pub author: Option<String>,
    pub content: String,
    pub media_ref: Option<String>,
    pub confidence: Option<f32>,
}

impl NewMessage {
    pub fn client(content: impl Into<String>, media_ref: Option<String>) -> Self {
        Self {
            sender: SenderRole::Client,
            author: None,
            content: content.into(),
            media_ref,
            confidence: None,
        }
    }

    pub fn automated(content: impl Into<String>, confidence: f32) -> Self {
        Self {
            sender: SenderRole::Automated,
            author: None,
            content: content.into(),
            media_ref: None,
            confidence: Some(confidence),
        }
    }

    pub fn human(operator: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: SenderRole::Human,
            author: Some(operator.into()),
            content: content.into(),
            media_ref: None,
            confidence: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            sender: SenderRole::System,
            author: None,
            content: content.into(),
            media_ref: None,
            confidence: None,
        }
    }
}

// --- Escalations ---

/// Why a human was asked to take over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LowConfidence,
    RepeatedFailedUnderstanding,
    Complaint,
    ComplexRequest,
    TechnicalIssue,
    PaymentIssue,
    ExplicitClientRequest,
    /// Synthetic record created when an operator takes over without a prior escalation.
    OperatorInitiated,
}

/// Escalation urgency. Ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Assigned,
    Resolved,
}

impl EscalationStatus {
    /// Pending and assigned escalations count against the one-open-per-conversation rule.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned)
    }
}

/// One request for human attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub conversation_id: String,
    pub reason: EscalationReason,
    pub priority: Priority,
    pub status: EscalationStatus,
    pub assignee: Option<String>,
    pub client_message: Option<String>,
    pub automated_reply: Option<String>,
    pub confidence: Option<f32>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Escalation {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Output of the decision engine: what the ledger should record, if anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub reason: EscalationReason,
    pub priority: Priority,
    pub client_message: Option<String>,
    pub automated_reply: Option<String>,
    pub confidence: Option<f32>,
}

/// Result of asking the ledger for an escalation.
///
/// A second request while one is open is not an error: the open one is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Escalation),
    AlreadyOpen(Escalation),
}

impl CreateOutcome {
    pub fn escalation(&self) -> &Escalation {
        match self {
            Self::Created(e) | Self::AlreadyOpen(e) => e,
        }
    }

    pub fn into_escalation(self) -> Escalation {
        match self {
            Self::Created(e) | Self::AlreadyOpen(e) => e,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Ledger list filters. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationFilter {
    #[serde(default)]
    pub status: Option<EscalationStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub reason: Option<EscalationReason>,
    #[serde(default)]
    pub assignee: Option<String>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// 1-based.
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl EscalationFilter {
    pub fn validate(&self) -> Result<(), LuminaError> {
        if self.page == Some(0) {
            return Err(LuminaError::Validation("page starts at 1".into()));
        }
        if let Some(per_page) = self.per_page
            && !(1..=MAX_PER_PAGE).contains(&per_page)
        {
            return Err(LuminaError::Validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(LuminaError::Validation(
                "date range `from` is after `to`".into(),
            ));
        }
        if self.assignee.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(LuminaError::Validation("assignee filter is empty".into()));
        }
        Ok(())
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Aggregate ledger counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_reason: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    /// Mean minutes from creation to resolution, over resolved escalations.
    pub mean_resolution_minutes: Option<f64>,
}

// --- Takeover sessions ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Paused,
}

/// One holder change on a takeover session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from_agent: String,
    pub to_agent: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// The exclusive right to answer on behalf of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeoverSession {
    pub conversation_id: String,
    /// The escalation this session is working, resolved when the session ends.
    pub escalation_id: Option<String>,
    pub holder: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub transfers: Vec<TransferRecord>,
}

/// Who may respond to a conversation right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControlState {
    /// No one in control; the automated agent answers.
    Automated,
    /// An escalation is open but no operator session exists.
    EscalatedUnassigned { escalation_id: String },
    /// A human holds an active session.
    Human { holder: String },
    /// A human holds a paused session. Advisory only.
    Paused { holder: String },
}

/// Which path handled an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HandledBy {
    Automated,
    Human,
}

// --- Inbound boundary ---

/// A web-chat message as posted by the public booking site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebInbound {
    pub client_ref: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

/// A single WhatsApp Cloud API message, already lifted out of the webhook envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsAppInbound {
    /// Sender phone id.
    pub wa_id: String,
    pub message_id: String,
    pub text: Option<String>,
    pub media_id: Option<String>,
    /// Unix seconds as reported by WhatsApp.
    pub timestamp: Option<i64>,
}

/// Channel-tagged inbound payload, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum InboundEnvelope {
    Web(WebInbound),
    #[serde(rename = "whatsapp")]
    WhatsApp(WhatsAppInbound),
}

/// The single internal message shape the router operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: Channel,
    pub client_ref: String,
    pub content: String,
    pub media_ref: Option<String>,
    /// Upstream message id, when the channel provides one.
    pub external_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InboundEnvelope {
    /// Validate and normalize into an [`InboundMessage`].
    ///
    /// A message needs a non-empty client reference and either text or media.
    pub fn into_inbound(self) -> Result<InboundMessage, LuminaError> {
        let (channel, client_ref, text, media_ref, external_id, received_at) = match self {
            InboundEnvelope::Web(web) => (
                Channel::Web,
                web.client_ref,
                web.text,
                web.media_url,
                None,
                Utc::now(),
            ),
            InboundEnvelope::WhatsApp(wa) => {
                let received_at = wa
                    .timestamp
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .unwrap_or_else(Utc::now);
                (
                    Channel::Whatsapp,
                    wa.wa_id,
                    wa.text,
                    wa.media_id,
                    Some(wa.message_id),
                    received_at,
                )
            }
        };

        let client_ref = client_ref.trim().to_string();
        if client_ref.is_empty() {
            return Err(LuminaError::Validation(
                "inbound message has an empty client reference".into(),
            ));
        }

        let content = text.map(|t| t.trim().to_string()).unwrap_or_default();
        let media_ref = media_ref.filter(|m| !m.trim().is_empty());
        if content.is_empty() && media_ref.is_none() {
            return Err(LuminaError::Validation(
                "inbound message carries neither text nor media".into(),
            ));
        }

        Ok(InboundMessage {
            channel,
            client_ref,
            content,
            media_ref,
            external_id,
            received_at,
        })
    }
}

// --- Generator and transport ---

/// What the reply generator sees besides the message itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyContext {
    pub conversation_id: String,
    pub channel: Channel,
    /// Recent history, oldest first.
    pub history: Vec<Message>,
}

/// A candidate automated reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
    /// 0.0 (no idea) to 1.0 (certain).
    pub confidence: f32,
    /// Set when the generator itself asks for a human.
    #[serde(default)]
    pub escalate: Option<EscalationReason>,
}

/// A message to push to the client over its channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub conversation_id: String,
    pub channel: Channel,
    pub client_ref: String,
    pub sender: SenderRole,
    pub content: String,
}

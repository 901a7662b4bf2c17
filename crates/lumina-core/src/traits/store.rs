// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation store trait: conversations and their append-only message logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LuminaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, Conversation, ConversationStatus, Message, NewMessage};

/// Persistence for conversations and messages, keyed by conversation id.
///
/// Conversation status is a projection of escalation and takeover state.
/// Implementations must reject a `set_status` that would diverge from it.
#[async_trait]
pub trait ConversationStore: PluginAdapter {
    /// Returns the open conversation for this client on this channel, creating
    /// one if none exists or the latest one is closed.
    async fn open_conversation(
        &self,
        client_ref: &str,
        channel: Channel,
    ) -> Result<Conversation, LuminaError>;

    /// Fails with `NotFound` for an unknown id.
    async fn get_conversation(&self, id: &str) -> Result<Conversation, LuminaError>;

    async fn set_status(&self, id: &str, status: ConversationStatus) -> Result<(), LuminaError>;

    /// Appends a message and bumps the conversation's last activity.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> Result<Message, LuminaError>;

    /// Messages in arrival order. `limit` keeps the most recent ones.
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, LuminaError>;

    /// Confidence of the latest `count` automated replies, newest first.
    async fn recent_confidences(
        &self,
        conversation_id: &str,
        count: usize,
    ) -> Result<Vec<f32>, LuminaError>;

    async fn touch(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<(), LuminaError>;
}

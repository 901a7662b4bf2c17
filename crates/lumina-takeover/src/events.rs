// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator event feed.
//!
//! A broadcast channel the operator dashboard (or any other listener)
//! subscribes to. Publishing never blocks and never fails: with no
//! subscribers the event is dropped, and slow subscribers observe `Lagged`.

use chrono::{DateTime, Utc};
use lumina_core::{Escalation, Message, TakeoverSession};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Something an operator may want to see right away.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorEvent {
    EscalationCreated {
        escalation: Escalation,
    },
    /// Inbound client message for the operator holding an active session.
    MessageForHolder {
        holder: String,
        message: Message,
    },
    /// Inbound client message queued while the holder's session is paused.
    MessageQueued {
        holder: String,
        message: Message,
    },
    SessionStarted {
        session: TakeoverSession,
    },
    SessionPaused {
        conversation_id: String,
        holder: String,
    },
    SessionResumed {
        conversation_id: String,
        holder: String,
    },
    SessionTransferred {
        conversation_id: String,
        from_agent: String,
        to_agent: String,
    },
    SessionEnded {
        conversation_id: String,
        holder: String,
        resolution: String,
    },
    /// The reaper ended an idle session.
    SessionReaped {
        conversation_id: String,
        holder: String,
        idle_since: DateTime<Utc>,
    },
}

impl OperatorEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::EscalationCreated { escalation } => &escalation.conversation_id,
            Self::MessageForHolder { message, .. } | Self::MessageQueued { message, .. } => {
                &message.conversation_id
            }
            Self::SessionStarted { session } => &session.conversation_id,
            Self::SessionPaused { conversation_id, .. }
            | Self::SessionResumed { conversation_id, .. }
            | Self::SessionTransferred { conversation_id, .. }
            | Self::SessionEnded { conversation_id, .. }
            | Self::SessionReaped { conversation_id, .. } => conversation_id,
        }
    }
}

/// Cloneable publisher handle.
#[derive(Clone)]
pub struct EventFeed {
    tx: broadcast::Sender<OperatorEvent>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperatorEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: OperatorEvent) {
        if self.tx.send(event).is_err() {
            trace!("operator event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Takeover session manager: the per-conversation control-ownership state
//! machine and the single source of truth for who may respond right now.
//!
//! ```text
//! Absent --start--> Active(a) --pause--> Paused(a) --resume--> Active(a)
//!                   Active(a) --transfer(b)--> Active(b)
//!                   Active(a) | Paused(a) --end--> Absent
//! ```
//!
//! Each transition runs under the conversation lock and inside one SQLite
//! transaction that also writes the audit message, moves the linked
//! escalation, and recomputes the conversation status. A failed transition
//! leaves the prior state intact.

use chrono::{DateTime, Utc};
use lumina_config::model::TakeoverConfig;
use lumina_core::{
    ControlState, ConversationStatus, EscalationReason, EscalationRequest, EscalationStatus,
    LuminaError, Message, NewMessage, OutboundMessage, Priority, SenderRole, SessionState,
    TakeoverSession, TransferRecord,
};
use lumina_storage::Database;
use lumina_storage::queries::{conversations, escalations, messages, takeovers};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::events::{EventFeed, OperatorEvent};
use crate::locks::ConversationLocks;
use crate::outbound::Outbound;

/// Owns takeover transitions for every conversation.
#[derive(Clone)]
pub struct TakeoverManager {
    db: Database,
    locks: ConversationLocks,
    events: EventFeed,
    outbound: Outbound,
}

impl TakeoverManager {
    pub fn new(db: Database, config: &TakeoverConfig) -> Self {
        Self {
            db,
            locks: ConversationLocks::new(),
            events: EventFeed::new(config.event_buffer),
            outbound: Outbound::default(),
        }
    }

    /// Deliver human replies through these transports.
    pub fn with_outbound(mut self, outbound: Outbound) -> Self {
        self.outbound = outbound;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The lock registry shared with the message router.
    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    pub fn events(&self) -> &EventFeed {
        &self.events
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// `Absent -> Active(agent)`.
    ///
    /// Takes the conversation's open escalation (assigning it when pending).
    /// Without one, an `operator_initiated` escalation is created already
    /// assigned to `agent`. Fails with `Conflict` when any session exists,
    /// when the open escalation is assigned to someone else, or when the
    /// conversation is closed.
    pub async fn start(
        &self,
        conversation_id: &str,
        agent: &str,
    ) -> Result<TakeoverSession, LuminaError> {
        let agent = require("agent id", agent)?;
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        let at = lumina_storage::now();
        let holder = agent.clone();

        let (session, synthetic, active) = self
            .db
            .write(move |tx| {
                let conversation = conversations::get(tx, &conv)?;
                if conversation.status == ConversationStatus::Closed {
                    return Err(LuminaError::Conflict(format!("conversation {conv} is closed")));
                }
                if let Some(existing) = takeovers::get(tx, &conv)? {
                    return Err(LuminaError::Conflict(format!(
                        "conversation {conv} is already held by {}",
                        existing.holder
                    )));
                }

                let mut synthetic = false;
                let escalation_id = match escalations::find_open(tx, &conv)? {
                    Some(open) if open.status == EscalationStatus::Pending => {
                        if !escalations::assign(tx, &open.id, &holder, at)? {
                            return Err(LuminaError::Conflict(format!(
                                "escalation {} is no longer pending",
                                open.id
                            )));
                        }
                        open.id
                    }
                    Some(open) => match open.assignee.as_deref() {
                        Some(assignee) if assignee != holder => {
                            return Err(LuminaError::Conflict(format!(
                                "escalation {} is assigned to {assignee}",
                                open.id
                            )));
                        }
                        _ => open.id,
                    },
                    None => {
                        synthetic = true;
                        escalations::insert(
                            tx,
                            &conv,
                            &operator_request(),
                            EscalationStatus::Assigned,
                            Some(&holder),
                            at,
                        )?
                        .id
                    }
                };

                let session = TakeoverSession {
                    conversation_id: conv.clone(),
                    escalation_id: Some(escalation_id),
                    holder: holder.clone(),
                    state: SessionState::Active,
                    started_at: at,
                    last_activity_at: at,
                    transfers: Vec::new(),
                };
                takeovers::insert(tx, &session)?;
                messages::append(
                    tx,
                    &conv,
                    &NewMessage::system(format!("{holder} tomó el control de la conversación.")),
                    at,
                )?;
                conversations::refresh_status(tx, &conv)?;
                Ok((session, synthetic, takeovers::count(tx)?))
            })
            .await?;

        info!(
            conversation_id,
            agent = %agent,
            escalation_id = session.escalation_id.as_deref().unwrap_or_default(),
            synthetic,
            "takeover started"
        );
        if synthetic {
            lumina_prometheus::record_escalation(
                &EscalationReason::OperatorInitiated.to_string(),
                &Priority::Medium.to_string(),
            );
        }
        lumina_prometheus::record_takeover("start");
        lumina_prometheus::set_takeover_sessions(active);
        self.events.publish(OperatorEvent::SessionStarted {
            session: session.clone(),
        });
        Ok(session)
    }

    /// `Active(agent) -> Paused(agent)`. Pausing forfeits exclusivity.
    pub async fn pause(
        &self,
        conversation_id: &str,
        agent: &str,
    ) -> Result<TakeoverSession, LuminaError> {
        let session = self
            .set_state(conversation_id, agent, SessionState::Paused)
            .await?;
        info!(conversation_id, agent, "takeover paused");
        lumina_prometheus::record_takeover("pause");
        self.events.publish(OperatorEvent::SessionPaused {
            conversation_id: conversation_id.to_string(),
            holder: session.holder.clone(),
        });
        Ok(session)
    }

    /// `Paused(agent) -> Active(agent)`.
    pub async fn resume(
        &self,
        conversation_id: &str,
        agent: &str,
    ) -> Result<TakeoverSession, LuminaError> {
        let session = self
            .set_state(conversation_id, agent, SessionState::Active)
            .await?;
        info!(conversation_id, agent, "takeover resumed");
        lumina_prometheus::record_takeover("resume");
        self.events.publish(OperatorEvent::SessionResumed {
            conversation_id: conversation_id.to_string(),
            holder: session.holder.clone(),
        });
        Ok(session)
    }

    async fn set_state(
        &self,
        conversation_id: &str,
        agent: &str,
        target: SessionState,
    ) -> Result<TakeoverSession, LuminaError> {
        let agent = require("agent id", agent)?;
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        let at = lumina_storage::now();

        self.db
            .write(move |tx| {
                let session = held_session(tx, &conv, &agent)?;
                if session.state == target {
                    return Err(LuminaError::Conflict(format!(
                        "session for {conv} is already {target}"
                    )));
                }
                if !takeovers::update(tx, &conv, &agent, &agent, target, at)? {
                    return Err(LuminaError::Conflict(format!(
                        "session for {conv} changed concurrently"
                    )));
                }
                let note = match target {
                    SessionState::Paused => format!("{agent} pausó la sesión."),
                    SessionState::Active => format!("{agent} reanudó la sesión."),
                };
                messages::append(tx, &conv, &NewMessage::system(note), at)?;
                present_session(tx, &conv)
            })
            .await
    }

    /// Hand the session to `to_agent` in one statement; no observer sees the
    /// session absent in between. From `Active` only the holder may transfer;
    /// a `Paused` session may be transferred by any operator. The result is
    /// always `Active(to_agent)`.
    pub async fn transfer(
        &self,
        conversation_id: &str,
        requested_by: &str,
        to_agent: &str,
        reason: Option<&str>,
    ) -> Result<TakeoverSession, LuminaError> {
        let requested_by = require("requesting agent id", requested_by)?;
        let to_agent = require("target agent id", to_agent)?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        let at = lumina_storage::now();
        let target = to_agent.clone();

        let (session, from_agent) = self
            .db
            .write(move |tx| {
                let current = takeovers::get(tx, &conv)?
                    .ok_or_else(|| LuminaError::not_found("takeover session", conv.as_str()))?;
                if current.state == SessionState::Active && current.holder != requested_by {
                    return Err(LuminaError::Conflict(format!(
                        "session for {conv} is held by {}",
                        current.holder
                    )));
                }
                if current.holder == target {
                    return Err(LuminaError::Validation(format!(
                        "{target} already holds the session"
                    )));
                }
                if !takeovers::update(tx, &conv, &current.holder, &target, SessionState::Active, at)? {
                    return Err(LuminaError::Conflict(format!(
                        "session for {conv} changed concurrently"
                    )));
                }
                if let Some(escalation_id) = current.escalation_id.as_deref() {
                    escalations::reassign(tx, escalation_id, &target, at)?;
                }
                takeovers::insert_transfer(
                    tx,
                    &conv,
                    &TransferRecord {
                        from_agent: current.holder.clone(),
                        to_agent: target.clone(),
                        reason: reason.clone(),
                        at,
                    },
                )?;
                let note = match &reason {
                    Some(r) => format!("Sesión transferida de {} a {target}: {r}", current.holder),
                    None => format!("Sesión transferida de {} a {target}.", current.holder),
                };
                messages::append(tx, &conv, &NewMessage::system(note), at)?;
                Ok((present_session(tx, &conv)?, current.holder))
            })
            .await?;

        info!(
            conversation_id,
            from = %from_agent,
            to = %to_agent,
            "takeover transferred"
        );
        lumina_prometheus::record_takeover("transfer");
        self.events.publish(OperatorEvent::SessionTransferred {
            conversation_id: conversation_id.to_string(),
            from_agent,
            to_agent,
        });
        Ok(session)
    }

    /// `Active | Paused -> Absent`, resolving the linked escalation with
    /// `resolution`. Returns the session as it was before ending.
    pub async fn end(
        &self,
        conversation_id: &str,
        agent: &str,
        resolution: &str,
    ) -> Result<TakeoverSession, LuminaError> {
        let agent = require("agent id", agent)?;
        let resolution = require("resolution", resolution)?;
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        let at = lumina_storage::now();
        let note = resolution.clone();

        let (session, active) = self
            .db
            .write(move |tx| {
                let session = held_session(tx, &conv, &agent)?;
                if let Some(escalation_id) = session.escalation_id.as_deref() {
                    escalations::resolve(
                        tx,
                        escalation_id,
                        &[EscalationStatus::Pending, EscalationStatus::Assigned],
                        &note,
                        at,
                    )?;
                }
                takeovers::end_with_note(
                    tx,
                    &conv,
                    &format!("{agent} finalizó la sesión: {note}"),
                    at,
                )?;
                Ok((session, takeovers::count(tx)?))
            })
            .await?;

        info!(conversation_id, agent = %session.holder, "takeover ended");
        lumina_prometheus::record_takeover("end");
        lumina_prometheus::set_takeover_sessions(active);
        self.events.publish(OperatorEvent::SessionEnded {
            conversation_id: conversation_id.to_string(),
            holder: session.holder.clone(),
            resolution,
        });
        Ok(session)
    }

    /// Append a human reply and deliver it. Requires an `Active` session held
    /// by `agent`.
    pub async fn reply(
        &self,
        conversation_id: &str,
        agent: &str,
        text: &str,
    ) -> Result<Message, LuminaError> {
        let agent = require("agent id", agent)?;
        let text = require("reply text", text)?;
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        let at = lumina_storage::now();

        let (message, conversation) = self
            .db
            .write(move |tx| {
                let conversation = conversations::get(tx, &conv)?;
                let session = held_session(tx, &conv, &agent)?;
                if session.state == SessionState::Paused {
                    return Err(LuminaError::Conflict(format!(
                        "session for {conv} is paused; resume before replying"
                    )));
                }
                let message = messages::append(tx, &conv, &NewMessage::human(&agent, text), at)?;
                takeovers::touch(tx, &conv, at)?;
                Ok((message, conversation))
            })
            .await?;

        self.outbound
            .deliver(&OutboundMessage {
                conversation_id: conversation.id,
                channel: conversation.channel,
                client_ref: conversation.client_ref,
                sender: SenderRole::Human,
                content: message.content.clone(),
            })
            .await;
        Ok(message)
    }

    /// The current session. `NotFound` when Absent.
    pub async fn get_session(&self, conversation_id: &str) -> Result<TakeoverSession, LuminaError> {
        let conv = conversation_id.to_string();
        self.db
            .read(move |conn| {
                takeovers::get(conn, &conv)?
                    .ok_or_else(|| LuminaError::not_found("takeover session", conv.as_str()))
            })
            .await
    }

    /// Sessions, optionally filtered by state, least recently active first.
    pub async fn list_sessions(
        &self,
        state: Option<SessionState>,
    ) -> Result<Vec<TakeoverSession>, LuminaError> {
        self.db.read(move |conn| takeovers::list(conn, state)).await
    }

    /// Who may respond to the conversation right now.
    pub async fn control_state(&self, conversation_id: &str) -> Result<ControlState, LuminaError> {
        let conv = conversation_id.to_string();
        self.db
            .read(move |conn| {
                conversations::get(conn, &conv)?;
                read_control_state(conn, &conv)
            })
            .await
    }

    /// End an idle session on behalf of the reaper.
    ///
    /// Re-checks idleness under the lock: a session touched after `idle_before`
    /// is left alone and `None` is returned.
    pub async fn force_end(
        &self,
        conversation_id: &str,
        idle_before: DateTime<Utc>,
        note: &str,
    ) -> Result<Option<TakeoverSession>, LuminaError> {
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        let note = note.to_string();
        let at = lumina_storage::now();

        let ended = self
            .db
            .write(move |tx| {
                let Some(session) = takeovers::get(tx, &conv)? else {
                    return Ok(None);
                };
                if session.last_activity_at >= idle_before {
                    return Ok(None);
                }
                if let Some(escalation_id) = session.escalation_id.as_deref() {
                    escalations::resolve(
                        tx,
                        escalation_id,
                        &[EscalationStatus::Pending, EscalationStatus::Assigned],
                        &note,
                        at,
                    )?;
                }
                takeovers::end_with_note(tx, &conv, &note, at)?;
                Ok(Some((session, takeovers::count(tx)?)))
            })
            .await?;

        let Some((session, active)) = ended else {
            return Ok(None);
        };
        warn!(
            conversation_id,
            holder = %session.holder,
            idle_since = %session.last_activity_at,
            "idle takeover session ended by reaper"
        );
        lumina_prometheus::record_takeover("reaped");
        lumina_prometheus::set_takeover_sessions(active);
        self.events.publish(OperatorEvent::SessionReaped {
            conversation_id: conversation_id.to_string(),
            holder: session.holder.clone(),
            idle_since: session.last_activity_at,
        });
        Ok(Some(session))
    }

    /// Close a conversation idle since before `idle_before` with nothing open.
    /// Returns false when it gained activity or control in the meantime.
    pub async fn close_if_idle(
        &self,
        conversation_id: &str,
        idle_before: DateTime<Utc>,
    ) -> Result<bool, LuminaError> {
        let _guard = self.locks.lock(conversation_id).await;
        let conv = conversation_id.to_string();
        self.db
            .write(move |tx| {
                let conversation = conversations::get(tx, &conv)?;
                if conversation.status == ConversationStatus::Closed
                    || conversation.last_activity_at >= idle_before
                    || conversations::has_open_control(tx, &conv)?
                {
                    return Ok(false);
                }
                conversations::set_status(tx, &conv, ConversationStatus::Closed)?;
                Ok(true)
            })
            .await
    }
}

/// Derive the control state from session and escalation rows.
pub fn read_control_state(conn: &Connection, conversation_id: &str) -> Result<ControlState, LuminaError> {
    if let Some(session) = takeovers::get(conn, conversation_id)? {
        return Ok(match session.state {
            SessionState::Active => ControlState::Human {
                holder: session.holder,
            },
            SessionState::Paused => ControlState::Paused {
                holder: session.holder,
            },
        });
    }
    Ok(match escalations::find_open(conn, conversation_id)? {
        Some(open) => ControlState::EscalatedUnassigned {
            escalation_id: open.id,
        },
        None => ControlState::Automated,
    })
}

fn held_session(
    conn: &Connection,
    conversation_id: &str,
    agent: &str,
) -> Result<TakeoverSession, LuminaError> {
    let session = takeovers::get(conn, conversation_id)?
        .ok_or_else(|| LuminaError::not_found("takeover session", conversation_id))?;
    if session.holder != agent {
        return Err(LuminaError::Conflict(format!(
            "session for {conversation_id} is held by {}",
            session.holder
        )));
    }
    Ok(session)
}

fn present_session(conn: &Connection, conversation_id: &str) -> Result<TakeoverSession, LuminaError> {
    takeovers::get(conn, conversation_id)?
        .ok_or_else(|| LuminaError::not_found("takeover session", conversation_id))
}

fn require(field: &str, value: &str) -> Result<String, LuminaError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LuminaError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn operator_request() -> EscalationRequest {
    EscalationRequest {
        reason: EscalationReason::OperatorInitiated,
        priority: Priority::Medium,
        client_message: None,
        automated_reply: None,
        confidence: None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use lumina_core::{
        AdapterType, Channel, EscalationReason, HealthStatus, OutboundTransport, PluginAdapter,
    };
    use lumina_escalation::EscalationLedger;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl PluginAdapter for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Transport
        }
        async fn health_check(&self) -> Result<HealthStatus, LuminaError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), LuminaError> {
            Ok(())
        }
    }

    #[async_trait]
    impl OutboundTransport for RecordingTransport {
        fn supports(&self, channel: Channel) -> bool {
            channel == Channel::Whatsapp
        }
        async fn deliver(&self, message: &OutboundMessage) -> Result<(), LuminaError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    async fn setup() -> (TakeoverManager, EscalationLedger, String) {
        let db = Database::open_in_memory().await.unwrap();
        let conv = db
            .write(|tx| {
                conversations::open_or_create(tx, "5215550001111", Channel::Whatsapp, lumina_storage::now())
            })
            .await
            .unwrap();
        let manager = TakeoverManager::new(db.clone(), &TakeoverConfig::default());
        (manager, EscalationLedger::new(db), conv.id)
    }

    fn complaint() -> EscalationRequest {
        EscalationRequest {
            reason: EscalationReason::Complaint,
            priority: Priority::High,
            client_message: Some("quiero poner una queja".into()),
            automated_reply: None,
            confidence: Some(0.9),
        }
    }

    async fn status(manager: &TakeoverManager, conv: &str) -> ConversationStatus {
        let conv = conv.to_string();
        manager
            .database()
            .read(move |c| conversations::get(c, &conv))
            .await
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn second_start_conflicts_and_holder_is_kept() {
        let (manager, ledger, conv) = setup().await;
        let esc = ledger.create(&conv, complaint()).await.unwrap().into_escalation();

        let session = manager.start(&conv, "ana").await.unwrap();
        assert_eq!(session.holder, "ana");
        assert_eq!(session.escalation_id.as_deref(), Some(esc.id.as_str()));
        assert_eq!(ledger.get(&esc.id).await.unwrap().assignee.as_deref(), Some("ana"));

        let err = manager.start(&conv, "luis").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(manager.get_session(&conv).await.unwrap().holder, "ana");
        assert_eq!(
            manager.control_state(&conv).await.unwrap(),
            ControlState::Human { holder: "ana".into() }
        );
    }

    #[tokio::test]
    async fn concurrent_starts_have_one_winner() {
        let (manager, ledger, conv) = setup().await;
        ledger.create(&conv, complaint()).await.unwrap();

        let mut handles = Vec::new();
        for agent in ["ana", "luis", "marta", "pablo", "sofia"] {
            let manager = manager.clone();
            let conv = conv.clone();
            handles.push(tokio::spawn(async move { manager.start(&conv, agent).await }));
        }
        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(session) => winners.push(session.holder),
                Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(manager.get_session(&conv).await.unwrap().holder, winners[0]);
        assert_eq!(manager.list_sessions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manual_start_creates_operator_escalation() {
        let (manager, ledger, conv) = setup().await;
        let session = manager.start(&conv, "ana").await.unwrap();
        let esc = ledger
            .get(session.escalation_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(esc.reason, EscalationReason::OperatorInitiated);
        assert_eq!(esc.status, EscalationStatus::Assigned);
        assert_eq!(esc.assignee.as_deref(), Some("ana"));
        assert_eq!(status(&manager, &conv).await, ConversationStatus::Escalated);
    }

    #[tokio::test]
    async fn start_respects_existing_assignment() {
        let (manager, ledger, conv) = setup().await;
        let esc = ledger.create(&conv, complaint()).await.unwrap().into_escalation();
        ledger.assign(&esc.id, "ana").await.unwrap();

        assert!(manager.start(&conv, "luis").await.unwrap_err().is_conflict());
        assert!(manager.start(&conv, "ana").await.is_ok());
    }

    #[tokio::test]
    async fn transitions_on_absent_session_are_not_found() {
        let (manager, _, conv) = setup().await;
        assert!(manager.pause(&conv, "ana").await.unwrap_err().is_not_found());
        assert!(manager.resume(&conv, "ana").await.unwrap_err().is_not_found());
        assert!(manager.transfer(&conv, "ana", "luis", None).await.unwrap_err().is_not_found());
        assert!(manager.end(&conv, "ana", "listo").await.unwrap_err().is_not_found());
        assert!(manager.get_session(&conv).await.unwrap_err().is_not_found());
        assert_eq!(manager.control_state(&conv).await.unwrap(), ControlState::Automated);
    }

    #[tokio::test]
    async fn pause_resume_require_the_holder() {
        let (manager, _, conv) = setup().await;
        manager.start(&conv, "ana").await.unwrap();

        assert!(manager.pause(&conv, "luis").await.unwrap_err().is_conflict());
        let paused = manager.pause(&conv, "ana").await.unwrap();
        assert_eq!(paused.state, SessionState::Paused);
        assert!(manager.pause(&conv, "ana").await.unwrap_err().is_conflict());
        assert_eq!(
            manager.control_state(&conv).await.unwrap(),
            ControlState::Paused { holder: "ana".into() }
        );

        // A paused session still blocks a fresh start.
        assert!(manager.start(&conv, "luis").await.unwrap_err().is_conflict());

        let resumed = manager.resume(&conv, "ana").await.unwrap();
        assert_eq!(resumed.state, SessionState::Active);
    }

    #[tokio::test]
    async fn transfer_moves_holder_and_escalation() {
        let (manager, ledger, conv) = setup().await;
        let esc = ledger.create(&conv, complaint()).await.unwrap().into_escalation();
        manager.start(&conv, "ana").await.unwrap();

        assert!(manager
            .transfer(&conv, "luis", "marta", None)
            .await
            .unwrap_err()
            .is_conflict());
        assert!(manager
            .transfer(&conv, "ana", "ana", None)
            .await
            .unwrap_err()
            .is_validation());

        let session = manager
            .transfer(&conv, "ana", "luis", Some("cambio de turno"))
            .await
            .unwrap();
        assert_eq!(session.holder, "luis");
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.transfers.len(), 1);
        assert_eq!(session.transfers[0].from_agent, "ana");
        assert_eq!(session.transfers[0].reason.as_deref(), Some("cambio de turno"));
        assert_eq!(ledger.get(&esc.id).await.unwrap().assignee.as_deref(), Some("luis"));
    }

    #[tokio::test]
    async fn paused_session_can_be_taken_over_by_transfer() {
        let (manager, _, conv) = setup().await;
        manager.start(&conv, "ana").await.unwrap();
        manager.pause(&conv, "ana").await.unwrap();

        let session = manager.transfer(&conv, "luis", "luis", None).await.unwrap();
        assert_eq!(session.holder, "luis");
        assert_eq!(session.state, SessionState::Active);
    }

    #[tokio::test]
    async fn transfer_never_exposes_an_absent_session() {
        let (manager, _, conv) = setup().await;
        manager.start(&conv, "a0").await.unwrap();

        let observer = {
            let manager = manager.clone();
            let conv = conv.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let state = manager.control_state(&conv).await.unwrap();
                    assert!(
                        matches!(state, ControlState::Human { .. }),
                        "observed {state:?} during transfers"
                    );
                    tokio::task::yield_now().await;
                }
            })
        };
        for i in 0..20 {
            let from = format!("a{i}");
            let to = format!("a{}", i + 1);
            manager.transfer(&conv, &from, &to, None).await.unwrap();
        }
        observer.await.unwrap();
        assert_eq!(manager.get_session(&conv).await.unwrap().transfers.len(), 20);
    }

    #[tokio::test]
    async fn end_resolves_escalation_and_restores_automation() {
        let (manager, ledger, conv) = setup().await;
        let esc = ledger.create(&conv, complaint()).await.unwrap().into_escalation();
        manager.start(&conv, "ana").await.unwrap();
        let mut events = manager.events().subscribe();

        assert!(manager.end(&conv, "ana", "  ").await.unwrap_err().is_validation());
        assert!(manager.end(&conv, "luis", "listo").await.unwrap_err().is_conflict());

        let ended = manager.end(&conv, "ana", "Reembolso aplicado").await.unwrap();
        assert_eq!(ended.holder, "ana");

        let stored = ledger.get(&esc.id).await.unwrap();
        assert_eq!(stored.status, EscalationStatus::Resolved);
        assert_eq!(stored.resolution.as_deref(), Some("Reembolso aplicado"));
        assert_eq!(status(&manager, &conv).await, ConversationStatus::Active);
        assert_eq!(manager.control_state(&conv).await.unwrap(), ControlState::Automated);
        assert!(matches!(events.recv().await.unwrap(), OperatorEvent::SessionEnded { .. }));

        // A new session can start afresh.
        assert!(manager.start(&conv, "luis").await.is_ok());
    }

    #[tokio::test]
    async fn every_transition_is_audited() {
        let (manager, _, conv) = setup().await;
        manager.start(&conv, "ana").await.unwrap();
        manager.pause(&conv, "ana").await.unwrap();
        manager.resume(&conv, "ana").await.unwrap();
        manager.transfer(&conv, "ana", "luis", None).await.unwrap();
        manager.end(&conv, "luis", "ok").await.unwrap();

        let conv_id = conv.clone();
        let log = manager
            .database()
            .read(move |c| messages::list(c, &conv_id, None))
            .await
            .unwrap();
        assert_eq!(log.len(), 5);
        assert!(log.iter().all(|m| m.sender == SenderRole::System));
    }

    #[tokio::test]
    async fn reply_requires_active_session_and_delivers() {
        let (manager, _, conv) = setup().await;
        let transport = Arc::new(RecordingTransport::default());
        let manager = manager.with_outbound(Outbound::new(vec![transport.clone() as Arc<dyn OutboundTransport>]));

        assert!(manager.reply(&conv, "ana", "hola").await.unwrap_err().is_not_found());
        manager.start(&conv, "ana").await.unwrap();
        assert!(manager.reply(&conv, "luis", "hola").await.unwrap_err().is_conflict());
        assert!(manager.reply(&conv, "ana", " ").await.unwrap_err().is_validation());

        let msg = manager.reply(&conv, "ana", "Hola, soy Ana.").await.unwrap();
        assert_eq!(msg.sender, SenderRole::Human);
        assert_eq!(msg.author.as_deref(), Some("ana"));
        {
            let sent = transport.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].client_ref, "5215550001111");
        }

        manager.pause(&conv, "ana").await.unwrap();
        assert!(manager.reply(&conv, "ana", "sigo aquí").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn start_on_closed_conversation_conflicts() {
        let (manager, _, conv) = setup().await;
        let later = lumina_storage::now() + chrono::Duration::hours(1);
        assert!(manager.close_if_idle(&conv, later).await.unwrap());
        assert_eq!(status(&manager, &conv).await, ConversationStatus::Closed);
        assert!(manager.start(&conv, "ana").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn force_end_skips_recently_active_sessions() {
        let (manager, ledger, conv) = setup().await;
        let esc = ledger.create(&conv, complaint()).await.unwrap().into_escalation();
        manager.start(&conv, "ana").await.unwrap();

        let long_ago = lumina_storage::now() - chrono::Duration::hours(1);
        assert!(manager.force_end(&conv, long_ago, "inactiva").await.unwrap().is_none());

        let later = lumina_storage::now() + chrono::Duration::seconds(1);
        let ended = manager.force_end(&conv, later, "inactiva").await.unwrap().unwrap();
        assert_eq!(ended.holder, "ana");
        assert_eq!(ledger.get(&esc.id).await.unwrap().status, EscalationStatus::Resolved);
        assert_eq!(status(&manager, &conv).await, ConversationStatus::Active);
    }
}

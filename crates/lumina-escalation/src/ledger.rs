// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalation ledger.
//!
//! Records escalation events and their status lifecycle
//! (`pending -> assigned -> resolved`). Every status change is a
//! compare-and-swap inside one SQLite transaction, so concurrent callers on
//! the same escalation observe exactly one winner. Each transaction also
//! recomputes the conversation status projection.

use chrono::{DateTime, Duration, Utc};
use lumina_core::{
    ConversationStatus, CreateOutcome, Escalation, EscalationFilter, EscalationRequest,
    EscalationStats, EscalationStatus, LuminaError, NewMessage, Page,
};
use lumina_storage::Database;
use lumina_storage::queries::{conversations, escalations, messages, takeovers};
use tracing::{info, warn};

/// Note recorded when an operator-triggered cleanup expires an escalation.
pub const STALE_NOTE: &str = "Cerrada automáticamente por inactividad.";

/// Note recorded when the reaper abandons a pending escalation.
pub const ABANDONED_NOTE: &str = "Abandonada: ningún operador la atendió a tiempo.";

/// Durable escalation records over the shared database.
#[derive(Clone)]
pub struct EscalationLedger {
    db: Database,
}

impl EscalationLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Open a pending escalation for the conversation.
    ///
    /// Idempotent while one is open: the existing escalation comes back as
    /// [`CreateOutcome::AlreadyOpen`] and nothing is written. Fails with
    /// `Conflict` on a closed conversation.
    pub async fn create(
        &self,
        conversation_id: &str,
        request: EscalationRequest,
    ) -> Result<CreateOutcome, LuminaError> {
        self.create_at(conversation_id, request, lumina_storage::now()).await
    }

    pub async fn create_at(
        &self,
        conversation_id: &str,
        request: EscalationRequest,
        at: DateTime<Utc>,
    ) -> Result<CreateOutcome, LuminaError> {
        let conv = conversation_id.to_string();
        let outcome = self
            .db
            .write(move |tx| {
                let conversation = conversations::get(tx, &conv)?;
                if conversation.status == ConversationStatus::Closed {
                    return Err(LuminaError::Conflict(format!(
                        "conversation {conv} is closed"
                    )));
                }
                let outcome = escalations::create_if_absent(tx, &conv, &request, at)?;
                conversations::refresh_status(tx, &conv)?;
                Ok(outcome)
            })
            .await?;

        let escalation = outcome.escalation();
        if outcome.is_created() {
            info!(
                conversation_id,
                escalation_id = %escalation.id,
                reason = %escalation.reason,
                priority = %escalation.priority,
                "escalation created"
            );
            lumina_prometheus::record_escalation(
                &escalation.reason.to_string(),
                &escalation.priority.to_string(),
            );
        } else {
            info!(
                conversation_id,
                escalation_id = %escalation.id,
                "escalation already open, create is a no-op"
            );
        }
        Ok(outcome)
    }

    pub async fn get(&self, id: &str) -> Result<Escalation, LuminaError> {
        let id = id.to_string();
        self.db.read(move |conn| escalations::get(conn, &id)).await
    }

    /// The pending or assigned escalation for a conversation.
    pub async fn open_for(&self, conversation_id: &str) -> Result<Option<Escalation>, LuminaError> {
        let conv = conversation_id.to_string();
        self.db
            .read(move |conn| escalations::find_open(conn, &conv))
            .await
    }

    /// Filtered, paginated listing, newest first.
    pub async fn list(&self, filter: EscalationFilter) -> Result<Page<Escalation>, LuminaError> {
        filter.validate()?;
        self.db
            .read(move |conn| escalations::list(conn, &filter))
            .await
    }

    /// `pending -> assigned`. A second concurrent call on the same escalation
    /// fails with `Conflict`.
    pub async fn assign(&self, id: &str, agent: &str) -> Result<Escalation, LuminaError> {
        let agent = agent.trim();
        if agent.is_empty() {
            return Err(LuminaError::Validation("agent id must not be empty".into()));
        }
        let (id_owned, agent_owned) = (id.to_string(), agent.to_string());
        let at = lumina_storage::now();
        let escalation = self
            .db
            .write(move |tx| {
                let current = escalations::get(tx, &id_owned)?;
                if !escalations::assign(tx, &id_owned, &agent_owned, at)? {
                    return Err(LuminaError::Conflict(format!(
                        "escalation {id_owned} is {}, not pending",
                        current.status
                    )));
                }
                escalations::get(tx, &id_owned)
            })
            .await?;
        info!(escalation_id = id, agent, "escalation assigned");
        Ok(escalation)
    }

    /// `assigned -> resolved`. Ends the takeover session linked to this
    /// escalation in the same transaction.
    pub async fn resolve(&self, id: &str, resolution: &str) -> Result<Escalation, LuminaError> {
        let resolution = resolution.trim();
        if resolution.is_empty() {
            return Err(LuminaError::Validation("resolution must not be empty".into()));
        }
        let (id_owned, note) = (id.to_string(), resolution.to_string());
        let at = lumina_storage::now();
        let (escalation, ended) = self
            .db
            .write(move |tx| {
                let current = escalations::get(tx, &id_owned)?;
                if !escalations::resolve(tx, &id_owned, &[EscalationStatus::Assigned], &note, at)? {
                    return Err(LuminaError::Conflict(format!(
                        "escalation {id_owned} is {}, not assigned",
                        current.status
                    )));
                }
                let ended = match takeovers::for_escalation(tx, &id_owned)? {
                    Some(session) => takeovers::end_with_note(
                        tx,
                        &session.conversation_id,
                        &format!("Sesión finalizada al resolver la escalación: {note}"),
                        at,
                    )?
                    .is_some(),
                    None => false,
                };
                conversations::refresh_status(tx, &current.conversation_id)?;
                Ok((escalations::get(tx, &id_owned)?, ended))
            })
            .await?;
        info!(
            escalation_id = id,
            conversation_id = %escalation.conversation_id,
            session_ended = ended,
            "escalation resolved"
        );
        Ok(escalation)
    }

    /// Resolve every pending or assigned escalation older than
    /// `hours_threshold` with an automatic note. Linked takeover sessions end
    /// in the same transaction. Returns the number expired.
    pub async fn expire_stale(&self, hours_threshold: u64) -> Result<usize, LuminaError> {
        self.expire_stale_at(hours_threshold, lumina_storage::now()).await
    }

    pub async fn expire_stale_at(
        &self,
        hours_threshold: u64,
        now: DateTime<Utc>,
    ) -> Result<usize, LuminaError> {
        if hours_threshold == 0 {
            return Err(LuminaError::Validation(
                "hours_threshold must be at least 1".into(),
            ));
        }
        let cutoff = hours_before(now, hours_threshold)?;
        let expired = self
            .expire(
                vec![EscalationStatus::Pending, EscalationStatus::Assigned],
                cutoff,
                STALE_NOTE,
                now,
            )
            .await?;
        if expired > 0 {
            warn!(count = expired, hours_threshold, "stale escalations expired");
        }
        Ok(expired)
    }

    /// Resolve pending escalations created before `cutoff` as abandoned.
    pub async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, LuminaError> {
        self.expire(vec![EscalationStatus::Pending], cutoff, ABANDONED_NOTE, now)
            .await
    }

    async fn expire(
        &self,
        statuses: Vec<EscalationStatus>,
        cutoff: DateTime<Utc>,
        note: &'static str,
        at: DateTime<Utc>,
    ) -> Result<usize, LuminaError> {
        self.db
            .write(move |tx| {
                let stale = escalations::created_before(tx, &statuses, cutoff)?;
                let mut expired = 0;
                for escalation in stale {
                    if !escalations::resolve(tx, &escalation.id, &statuses, note, at)? {
                        continue;
                    }
                    let ended = match takeovers::for_escalation(tx, &escalation.id)? {
                        Some(session) => {
                            takeovers::end_with_note(tx, &session.conversation_id, note, at)?
                                .is_some()
                        }
                        None => false,
                    };
                    if !ended {
                        messages::append(
                            tx,
                            &escalation.conversation_id,
                            &NewMessage::system(note),
                            at,
                        )?;
                    }
                    conversations::refresh_status(tx, &escalation.conversation_id)?;
                    expired += 1;
                }
                Ok(expired)
            })
            .await
    }

    /// Counts by status, reason, and priority plus mean resolution time.
    pub async fn stats(&self) -> Result<EscalationStats, LuminaError> {
        self.db.read(escalations::stats).await
    }

    /// Delete resolved escalations resolved more than `retention_days` ago.
    pub async fn purge_resolved(&self, retention_days: u64) -> Result<usize, LuminaError> {
        self.purge_resolved_at(retention_days, lumina_storage::now()).await
    }

    pub async fn purge_resolved_at(
        &self,
        retention_days: u64,
        now: DateTime<Utc>,
    ) -> Result<usize, LuminaError> {
        if retention_days == 0 {
            return Err(LuminaError::Validation(
                "retention_days must be at least 1".into(),
            ));
        }
        let cutoff = hours_before(now, retention_days.saturating_mul(24))?;
        let purged = self
            .db
            .write(move |tx| escalations::purge_resolved_before(tx, cutoff))
            .await?;
        if purged > 0 {
            info!(count = purged, retention_days, "resolved escalations purged");
        }
        Ok(purged)
    }
}

fn hours_before(now: DateTime<Utc>, n: u64) -> Result<DateTime<Utc>, LuminaError> {
    i64::try_from(n)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| LuminaError::Validation(format!("{n} hours is out of range")))
}

// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session reaper.
//!
//! A periodic sweep that bounds the lifetime of every lock: idle takeover
//! sessions are force-ended, pending escalations nobody picked up are
//! abandoned, idle conversations are closed, and resolved escalations past
//! the retention horizon are scrubbed. Forced actions are logged and counted,
//! never reported to anyone synchronously.

use chrono::{DateTime, Duration, Utc};
use lumina_config::model::ReaperConfig;
use lumina_core::LuminaError;
use lumina_escalation::EscalationLedger;
use lumina_storage::queries::{conversations, takeovers};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::manager::TakeoverManager;

/// Audit note for sessions ended by the reaper.
pub const REAPED_NOTE: &str = "Sesión finalizada automáticamente por inactividad del operador.";

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions_ended: usize,
    pub escalations_abandoned: usize,
    pub conversations_closed: usize,
    pub escalations_purged: usize,
    pub locks_pruned: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct SessionReaper {
    manager: TakeoverManager,
    ledger: EscalationLedger,
    config: ReaperConfig,
}

impl SessionReaper {
    pub fn new(manager: TakeoverManager, ledger: EscalationLedger, config: ReaperConfig) -> Self {
        Self {
            manager,
            ledger,
            config,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, LuminaError> {
        self.sweep_at(lumina_storage::now()).await
    }

    /// One sweep evaluated against `now`.
    ///
    /// A failure on one conversation is logged and the sweep continues.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, LuminaError> {
        let db = self.manager.database();
        let mut report = SweepReport::default();

        let session_cutoff = before(now, Duration::try_minutes(to_i64(self.config.session_inactivity_mins)));
        let idle = db
            .read(move |conn| takeovers::idle_before(conn, session_cutoff))
            .await?;
        for session in idle {
            match self
                .manager
                .force_end(&session.conversation_id, session_cutoff, REAPED_NOTE)
                .await
            {
                Ok(Some(_)) => report.sessions_ended += 1,
                Ok(None) => debug!(
                    conversation_id = %session.conversation_id,
                    "session became active before it was reaped"
                ),
                Err(e) => warn!(
                    conversation_id = %session.conversation_id,
                    error = %e,
                    "failed to reap idle session"
                ),
            }
        }

        let pending_cutoff = before(
            now,
            Duration::try_hours(to_i64(self.config.pending_escalation_max_age_hours)),
        );
        report.escalations_abandoned = self.ledger.expire_pending_before(pending_cutoff, now).await?;
        if report.escalations_abandoned > 0 {
            warn!(count = report.escalations_abandoned, "pending escalations abandoned");
        }

        let close_cutoff = before(
            now,
            Duration::try_hours(to_i64(self.config.conversation_idle_close_hours)),
        );
        let idle_conversations = db
            .read(move |conn| conversations::idle_without_control(conn, close_cutoff))
            .await?;
        for conversation_id in idle_conversations {
            match self.manager.close_if_idle(&conversation_id, close_cutoff).await {
                Ok(true) => report.conversations_closed += 1,
                Ok(false) => {}
                Err(e) => warn!(%conversation_id, error = %e, "failed to close idle conversation"),
            }
        }

        if let Some(days) = self.config.retention_days {
            report.escalations_purged = self.ledger.purge_resolved_at(days, now).await?;
        }

        report.locks_pruned = self.manager.locks().prune();

        lumina_prometheus::record_reaper_action("session_ended", report.sessions_ended as u64);
        lumina_prometheus::record_reaper_action(
            "escalation_abandoned",
            report.escalations_abandoned as u64,
        );
        lumina_prometheus::record_reaper_action(
            "conversation_closed",
            report.conversations_closed as u64,
        );
        lumina_prometheus::record_reaper_action(
            "escalation_purged",
            report.escalations_purged as u64,
        );

        if report.is_empty() {
            debug!("reaper sweep found nothing to do");
        } else {
            info!(
                sessions_ended = report.sessions_ended,
                escalations_abandoned = report.escalations_abandoned,
                conversations_closed = report.conversations_closed,
                escalations_purged = report.escalations_purged,
                locks_pruned = report.locks_pruned,
                "reaper sweep complete"
            );
        }
        Ok(report)
    }

    /// Sweep on the configured interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.config.interval_secs, "session reaper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "reaper sweep failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("session reaper stopped");
                    break;
                }
            }
        }
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `now - span`, clamped to the earliest representable instant.
fn before(now: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

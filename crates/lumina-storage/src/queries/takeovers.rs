// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Takeover sessions and their transfer history.

use chrono::{DateTime, Utc};
use lumina_core::{LuminaError, NewMessage, SessionState, TakeoverSession, TransferRecord};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{SqlResultExt, is_unique_violation, storage_err};
use crate::models::{SESSION_COLUMNS, fmt_ts, session_from_row, ts};
use crate::queries::{conversations, messages};

/// The session for a conversation, with transfers made since it started.
pub fn get(conn: &Connection, conversation_id: &str) -> Result<Option<TakeoverSession>, LuminaError> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM takeover_sessions WHERE conversation_id = ?1"),
            params![conversation_id],
            session_from_row,
        )
        .optional()
        .sql()?;
    session.map(|s| with_transfers(conn, s)).transpose()
}

fn with_transfers(
    conn: &Connection,
    mut session: TakeoverSession,
) -> Result<TakeoverSession, LuminaError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT from_agent, to_agent, reason, at FROM takeover_transfers
             WHERE conversation_id = ?1 AND at >= ?2 ORDER BY id",
        )
        .sql()?;
    let rows = stmt
        .query_map(
            params![session.conversation_id, fmt_ts(session.started_at)],
            |row| {
                Ok(TransferRecord {
                    from_agent: row.get(0)?,
                    to_agent: row.get(1)?,
                    reason: row.get(2)?,
                    at: ts(row, 3)?,
                })
            },
        )
        .sql()?;
    session.transfers = rows.collect::<Result<Vec<_>, _>>().sql()?;
    Ok(session)
}

/// All sessions, optionally in one state, longest-idle first.
pub fn list(conn: &Connection, state: Option<SessionState>) -> Result<Vec<TakeoverSession>, LuminaError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM takeover_sessions
             WHERE ?1 IS NULL OR state = ?1 ORDER BY last_activity_at"
        ))
        .sql()?;
    let rows = stmt
        .query_map(params![state.map(|s| s.to_string())], session_from_row)
        .sql()?;
    let sessions = rows.collect::<Result<Vec<_>, _>>().sql()?;
    sessions
        .into_iter()
        .map(|s| with_transfers(conn, s))
        .collect()
}

/// Sessions whose last activity is before `cutoff`.
pub fn idle_before(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<TakeoverSession>, LuminaError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM takeover_sessions
             WHERE last_activity_at < ?1 ORDER BY last_activity_at"
        ))
        .sql()?;
    let rows = stmt
        .query_map(params![fmt_ts(cutoff)], session_from_row)
        .sql()?;
    rows.collect::<Result<Vec<_>, _>>().sql()
}

/// The session working a given escalation, if any.
pub fn for_escalation(
    conn: &Connection,
    escalation_id: &str,
) -> Result<Option<TakeoverSession>, LuminaError> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM takeover_sessions WHERE escalation_id = ?1"),
        params![escalation_id],
        session_from_row,
    )
    .optional()
    .sql()
}

pub fn count(conn: &Connection) -> Result<u64, LuminaError> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM takeover_sessions", [], |row| row.get(0))
        .sql()?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// Insert a new session. An existing session for the conversation is a `Conflict`.
pub fn insert(conn: &Connection, session: &TakeoverSession) -> Result<(), LuminaError> {
    conn.execute(
        &format!("INSERT INTO takeover_sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            session.conversation_id,
            session.escalation_id,
            session.holder,
            session.state.to_string(),
            fmt_ts(session.started_at),
            fmt_ts(session.last_activity_at),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            LuminaError::Conflict(format!(
                "conversation {} already has a takeover session",
                session.conversation_id
            ))
        } else {
            storage_err(e)
        }
    })?;
    Ok(())
}

/// Set holder and state in one statement, guarded by the expected current holder.
pub fn update(
    conn: &Connection,
    conversation_id: &str,
    expected_holder: &str,
    holder: &str,
    state: SessionState,
    at: DateTime<Utc>,
) -> Result<bool, LuminaError> {
    let changed = conn
        .execute(
            "UPDATE takeover_sessions SET holder = ?3, state = ?4, last_activity_at = ?5
             WHERE conversation_id = ?1 AND holder = ?2",
            params![conversation_id, expected_holder, holder, state.to_string(), fmt_ts(at)],
        )
        .sql()?;
    Ok(changed == 1)
}

pub fn touch(conn: &Connection, conversation_id: &str, at: DateTime<Utc>) -> Result<(), LuminaError> {
    conn.execute(
        "UPDATE takeover_sessions SET last_activity_at = MAX(last_activity_at, ?2)
         WHERE conversation_id = ?1",
        params![conversation_id, fmt_ts(at)],
    )
    .sql()?;
    Ok(())
}

/// Remove the session. Returns false when none existed.
pub fn delete(conn: &Connection, conversation_id: &str) -> Result<bool, LuminaError> {
    let changed = conn
        .execute(
            "DELETE FROM takeover_sessions WHERE conversation_id = ?1",
            params![conversation_id],
        )
        .sql()?;
    Ok(changed == 1)
}

/// End the session: delete it, append `note` as a system message, and
/// refresh the conversation status. Returns the ended session, if one existed.
pub fn end_with_note(
    conn: &Connection,
    conversation_id: &str,
    note: &str,
    at: DateTime<Utc>,
) -> Result<Option<TakeoverSession>, LuminaError> {
    let Some(session) = get(conn, conversation_id)? else {
        return Ok(None);
    };
    delete(conn, conversation_id)?;
    messages::append(conn, conversation_id, &NewMessage::system(note), at)?;
    conversations::refresh_status(conn, conversation_id)?;
    Ok(Some(session))
}

pub fn insert_transfer(
    conn: &Connection,
    conversation_id: &str,
    record: &TransferRecord,
) -> Result<(), LuminaError> {
    conn.execute(
        "INSERT INTO takeover_transfers (conversation_id, from_agent, to_agent, reason, at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            conversation_id,
            record.from_agent,
            record.to_agent,
            record.reason,
            fmt_ts(record.at)
        ],
    )
    .sql()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::models::now;
    use crate::queries::conversations;
    use lumina_core::Channel;

    fn session(conversation_id: &str, holder: &str) -> TakeoverSession {
        let at = now();
        TakeoverSession {
            conversation_id: conversation_id.to_string(),
            escalation_id: None,
            holder: holder.to_string(),
            state: SessionState::Active,
            started_at: at,
            last_activity_at: at,
            transfers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn one_session_per_conversation() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db
            .write(|tx| {
                let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
                insert(tx, &session(&c.id, "ana"))?;
                insert(tx, &session(&c.id, "luis"))
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_is_guarded_by_holder_and_transfers_load() {
        let db = Database::open_in_memory().await.unwrap();
        let loaded = db
            .write(|tx| {
                let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
                insert(tx, &session(&c.id, "ana"))?;
                assert!(!update(tx, &c.id, "luis", "luis", SessionState::Active, now())?);
                assert!(update(tx, &c.id, "ana", "luis", SessionState::Active, now())?);
                insert_transfer(
                    tx,
                    &c.id,
                    &TransferRecord {
                        from_agent: "ana".into(),
                        to_agent: "luis".into(),
                        reason: Some("turno".into()),
                        at: now(),
                    },
                )?;
                get(tx, &c.id)
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.holder, "luis");
        assert_eq!(loaded.transfers.len(), 1);
        assert_eq!(loaded.transfers[0].from_agent, "ana");
    }

    #[tokio::test]
    async fn end_with_note_audits_and_reprojects() {
        let db = Database::open_in_memory().await.unwrap();
        let (ended, status, log) = db
            .write(|tx| {
                let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
                insert(tx, &session(&c.id, "ana"))?;
                assert_eq!(
                    conversations::refresh_status(tx, &c.id)?,
                    lumina_core::ConversationStatus::Escalated
                );
                let ended = end_with_note(tx, &c.id, "session ended", now())?;
                let status = conversations::get(tx, &c.id)?.status;
                Ok((ended, status, messages::list(tx, &c.id, None)?))
            })
            .await
            .unwrap();
        assert_eq!(ended.unwrap().holder, "ana");
        assert_eq!(status, lumina_core::ConversationStatus::Active);
        assert_eq!(log.last().unwrap().sender, lumina_core::SenderRole::System);
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let db = Database::open_in_memory().await.unwrap();
        let (first, second) = db
            .write(|tx| {
                let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
                insert(tx, &session(&c.id, "ana"))?;
                Ok((delete(tx, &c.id)?, delete(tx, &c.id)?))
            })
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }
}

// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation records and the status projection.

use chrono::{DateTime, Utc};
use lumina_core::{Channel, Conversation, ConversationStatus, LuminaError};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::SqlResultExt;
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row, fmt_ts};

pub fn get(conn: &Connection, id: &str) -> Result<Conversation, LuminaError> {
    find(conn, id)?.ok_or_else(|| LuminaError::not_found("conversation", id))
}

pub fn find(conn: &Connection, id: &str) -> Result<Option<Conversation>, LuminaError> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        conversation_from_row,
    )
    .optional()
    .sql()
}

/// The non-closed conversation for this client on this channel, if any.
pub fn find_open(
    conn: &Connection,
    client_ref: &str,
    channel: Channel,
) -> Result<Option<Conversation>, LuminaError> {
    conn.query_row(
        &format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE channel = ?1 AND client_ref = ?2 AND status != 'closed'"
        ),
        params![channel.to_string(), client_ref],
        conversation_from_row,
    )
    .optional()
    .sql()
}

/// Returns the open conversation for the client, creating one when none exists.
pub fn open_or_create(
    conn: &Connection,
    client_ref: &str,
    channel: Channel,
    at: DateTime<Utc>,
) -> Result<Conversation, LuminaError> {
    if let Some(existing) = find_open(conn, client_ref, channel)? {
        return Ok(existing);
    }
    let conversation = Conversation {
        id: uuid::Uuid::new_v4().to_string(),
        channel,
        client_ref: client_ref.to_string(),
        status: ConversationStatus::Active,
        created_at: at,
        last_activity_at: at,
    };
    conn.execute(
        "INSERT INTO conversations (id, channel, client_ref, status, created_at, last_activity_at)
         VALUES (?1, ?2, ?3, 'active', ?4, ?4)",
        params![
            conversation.id,
            channel.to_string(),
            conversation.client_ref,
            fmt_ts(at)
        ],
    )
    .sql()?;
    debug!(conversation_id = %conversation.id, %channel, "conversation created");
    Ok(conversation)
}

/// Move last activity forward. Never moves it backwards.
pub fn touch(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<(), LuminaError> {
    let changed = conn
        .execute(
            "UPDATE conversations SET last_activity_at = MAX(last_activity_at, ?2) WHERE id = ?1",
            params![id, fmt_ts(at)],
        )
        .sql()?;
    if changed == 0 {
        return Err(LuminaError::not_found("conversation", id));
    }
    Ok(())
}

/// Whether a takeover session or an open escalation exists.
pub fn has_open_control(conn: &Connection, id: &str) -> Result<bool, LuminaError> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM takeover_sessions WHERE conversation_id = ?1)
             OR EXISTS (SELECT 1 FROM escalations
                        WHERE conversation_id = ?1 AND status IN ('pending', 'assigned'))",
        params![id],
        |row| row.get(0),
    )
    .sql()
}

/// The status the record must hold given current escalation and session state.
pub fn projected_status(
    conn: &Connection,
    conversation: &Conversation,
) -> Result<ConversationStatus, LuminaError> {
    if conversation.status == ConversationStatus::Closed {
        return Ok(ConversationStatus::Closed);
    }
    Ok(if has_open_control(conn, &conversation.id)? {
        ConversationStatus::Escalated
    } else {
        ConversationStatus::Active
    })
}

/// Recompute and persist the status projection. Returns the new status.
pub fn refresh_status(conn: &Connection, id: &str) -> Result<ConversationStatus, LuminaError> {
    let conversation = get(conn, id)?;
    let status = projected_status(conn, &conversation)?;
    if status != conversation.status {
        write_status(conn, id, status)?;
        debug!(conversation_id = id, from = %conversation.status, to = %status, "status projected");
    }
    Ok(status)
}

/// Explicit status change, accepted only when consistent with the projection.
///
/// `closed` requires that nothing is open; a closed conversation stays closed.
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: ConversationStatus,
) -> Result<(), LuminaError> {
    let conversation = get(conn, id)?;
    if conversation.status == status {
        return Ok(());
    }
    if conversation.status == ConversationStatus::Closed {
        return Err(LuminaError::Conflict(format!(
            "conversation {id} is closed and cannot become {status}"
        )));
    }
    let open_control = has_open_control(conn, id)?;
    let consistent = match status {
        ConversationStatus::Closed | ConversationStatus::Active => !open_control,
        ConversationStatus::Escalated => open_control,
    };
    if !consistent {
        return Err(LuminaError::Conflict(format!(
            "status {status} diverges from the control state of conversation {id}"
        )));
    }
    write_status(conn, id, status)
}

fn write_status(conn: &Connection, id: &str, status: ConversationStatus) -> Result<(), LuminaError> {
    conn.execute(
        "UPDATE conversations SET status = ?2 WHERE id = ?1",
        params![id, status.to_string()],
    )
    .sql()?;
    Ok(())
}

/// Non-closed conversations idle since before `cutoff` with nothing open.
pub fn idle_without_control(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<String>, LuminaError> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id FROM conversations c
             WHERE c.status != 'closed' AND c.last_activity_at < ?1
               AND NOT EXISTS (SELECT 1 FROM takeover_sessions s WHERE s.conversation_id = c.id)
               AND NOT EXISTS (SELECT 1 FROM escalations e
                               WHERE e.conversation_id = c.id
                                 AND e.status IN ('pending', 'assigned'))
             ORDER BY c.last_activity_at",
        )
        .sql()?;
    let rows = stmt
        .query_map(params![fmt_ts(cutoff)], |row| row.get(0))
        .sql()?;
    rows.collect::<Result<Vec<String>, _>>().sql()
}

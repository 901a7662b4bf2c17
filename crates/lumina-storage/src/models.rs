// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `lumina-core`.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with millisecond
//! precision so that lexical order equals chronological order. Enums are
//! stored as their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub use lumina_core::types::{Conversation, Escalation, Message, TakeoverSession};

/// Format a timestamp for storage.
pub fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time, truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn conversion_err(
    idx: usize,
    ty: Type,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

pub(crate) fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, Type::Text, e))
}

pub(crate) fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_err(idx, Type::Text, e)),
    }
}

pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, Type::Text, e))
}

pub(crate) fn opt_f32(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<f32>> {
    Ok(row.get::<_, Option<f64>>(idx)?.map(|v| v as f32))
}

pub(crate) const CONVERSATION_COLUMNS: &str =
    "id, channel, client_ref, status, created_at, last_activity_at";

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        channel: enum_col(row, 1)?,
        client_ref: row.get(2)?,
        status: enum_col(row, 3)?,
        created_at: ts(row, 4)?,
        last_activity_at: ts(row, 5)?,
    })
}

pub(crate) const MESSAGE_COLUMNS: &str =
    "seq, id, conversation_id, sender, author, content, media_ref, confidence, created_at";

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        seq: row.get(0)?,
        id: row.get(1)?,
        conversation_id: row.get(2)?,
        sender: enum_col(row, 3)?,
        author: row.get(4)?,
        content: row.get(5)?,
        media_ref: row.get(6)?,
        confidence: opt_f32(row, 7)?,
        created_at: ts(row, 8)?,
    })
}

pub(crate) const ESCALATION_COLUMNS: &str = "id, conversation_id, reason, priority, status, \
     assignee, client_message, automated_reply, confidence, resolution, created_at, \
     assigned_at, resolved_at";

pub(crate) fn escalation_from_row(row: &Row<'_>) -> rusqlite::Result<Escalation> {
    Ok(Escalation {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        reason: enum_col(row, 2)?,
        priority: enum_col(row, 3)?,
        status: enum_col(row, 4)?,
        assignee: row.get(5)?,
        client_message: row.get(6)?,
        automated_reply: row.get(7)?,
        confidence: opt_f32(row, 8)?,
        resolution: row.get(9)?,
        created_at: ts(row, 10)?,
        assigned_at: opt_ts(row, 11)?,
        resolved_at: opt_ts(row, 12)?,
    })
}

pub(crate) const SESSION_COLUMNS: &str =
    "conversation_id, escalation_id, holder, state, started_at, last_activity_at";

/// Maps the session row; transfer history is loaded separately.
pub(crate) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<TakeoverSession> {
    Ok(TakeoverSession {
        conversation_id: row.get(0)?,
        escalation_id: row.get(1)?,
        holder: row.get(2)?,
        state: enum_col(row, 3)?,
        started_at: ts(row, 4)?,
        last_activity_at: ts(row, 5)?,
        transfers: Vec::new(),
    })
}

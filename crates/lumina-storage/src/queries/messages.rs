// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log.

use chrono::{DateTime, Utc};
use lumina_core::{ConversationStatus, LuminaError, Message, NewMessage, SenderRole};
use rusqlite::{Connection, params};

use crate::error::SqlResultExt;
use crate::models::{MESSAGE_COLUMNS, fmt_ts, message_from_row};
use crate::queries::conversations;

/// Append a message and move the conversation's last activity forward.
///
/// A closed conversation only accepts system audit entries; anything else
/// fails with `Conflict`.
pub fn append(
    conn: &Connection,
    conversation_id: &str,
    message: &NewMessage,
    at: DateTime<Utc>,
) -> Result<Message, LuminaError> {
    let conversation = conversations::get(conn, conversation_id)?;
    if conversation.status == ConversationStatus::Closed && message.sender != SenderRole::System {
        return Err(LuminaError::Conflict(format!(
            "conversation {conversation_id} is closed"
        )));
    }
    conversations::touch(conn, conversation_id, at)?;

    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender, author, content, media_ref, confidence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            conversation_id,
            message.sender.to_string(),
            message.author,
            message.content,
            message.media_ref,
            message.confidence.map(f64::from),
            fmt_ts(at),
        ],
    )
    .sql()?;

    Ok(Message {
        id,
        conversation_id: conversation_id.to_string(),
        seq: conn.last_insert_rowid(),
        sender: message.sender,
        author: message.author.clone(),
        content: message.content.clone(),
        media_ref: message.media_ref.clone(),
        confidence: message.confidence,
        created_at: at,
    })
}

/// Messages in arrival order. With `limit`, only the most recent `limit`.
pub fn list(
    conn: &Connection,
    conversation_id: &str,
    limit: Option<usize>,
) -> Result<Vec<Message>, LuminaError> {
    let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                 SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC"
        ))
        .sql()?;
    let rows = stmt
        .query_map(params![conversation_id, limit], message_from_row)
        .sql()?;
    rows.collect::<Result<Vec<_>, _>>().sql()
}

/// Confidence of the most recent automated replies, newest first.
pub fn recent_automated_confidences(
    conn: &Connection,
    conversation_id: &str,
    count: usize,
) -> Result<Vec<f32>, LuminaError> {
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    let mut stmt = conn
        .prepare(
            "SELECT confidence FROM messages
             WHERE conversation_id = ?1 AND sender = ?2
             ORDER BY seq DESC LIMIT ?3",
        )
        .sql()?;
    let rows = stmt
        .query_map(
            params![conversation_id, SenderRole::Automated.to_string(), count],
            |row| row.get::<_, Option<f64>>(0),
        )
        .sql()?;
    let mut out = Vec::new();
    for row in rows {
        // Replies without a recorded confidence count as fully confident.
        out.push(row.sql()?.map_or(1.0, |c| c as f32));
    }
    Ok(out)
}

// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalation records. Status changes are compare-and-swap updates guarded
//! by the expected current status.

use chrono::{DateTime, Utc};
use lumina_core::{
    CreateOutcome, Escalation, EscalationFilter, EscalationRequest, EscalationStats,
    EscalationStatus, LuminaError, Page,
};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::{SqlResultExt, is_unique_violation, storage_err};
use crate::models::{ESCALATION_COLUMNS, escalation_from_row, fmt_ts};

pub fn get(conn: &Connection, id: &str) -> Result<Escalation, LuminaError> {
    conn.query_row(
        &format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE id = ?1"),
        params![id],
        escalation_from_row,
    )
    .optional()
    .sql()?
    .ok_or_else(|| LuminaError::not_found("escalation", id))
}

/// The pending or assigned escalation for a conversation, if any.
pub fn find_open(conn: &Connection, conversation_id: &str) -> Result<Option<Escalation>, LuminaError> {
    conn.query_row(
        &format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalations
             WHERE conversation_id = ?1 AND status IN ('pending', 'assigned')"
        ),
        params![conversation_id],
        escalation_from_row,
    )
    .optional()
    .sql()
}

/// Insert a new escalation with the given initial status.
///
/// A second open escalation for the same conversation violates the partial
/// unique index and surfaces as `Conflict`.
pub fn insert(
    conn: &Connection,
    conversation_id: &str,
    request: &EscalationRequest,
    status: EscalationStatus,
    assignee: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Escalation, LuminaError> {
    let escalation = Escalation {
        id: uuid::Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        reason: request.reason,
        priority: request.priority,
        status,
        assignee: assignee.map(str::to_string),
        client_message: request.client_message.clone(),
        automated_reply: request.automated_reply.clone(),
        confidence: request.confidence,
        resolution: None,
        created_at: at,
        assigned_at: assignee.map(|_| at),
        resolved_at: None,
    };
    conn.execute(
        &format!(
            "INSERT INTO escalations ({ESCALATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11, NULL)"
        ),
        params![
            escalation.id,
            escalation.conversation_id,
            escalation.reason.to_string(),
            escalation.priority.to_string(),
            escalation.status.to_string(),
            escalation.assignee,
            escalation.client_message,
            escalation.automated_reply,
            escalation.confidence.map(f64::from),
            fmt_ts(at),
            escalation.assigned_at.map(fmt_ts),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            LuminaError::Conflict(format!(
                "conversation {conversation_id} already has an open escalation"
            ))
        } else {
            storage_err(e)
        }
    })?;
    Ok(escalation)
}

/// Create a pending escalation unless one is already open.
pub fn create_if_absent(
    conn: &Connection,
    conversation_id: &str,
    request: &EscalationRequest,
    at: DateTime<Utc>,
) -> Result<CreateOutcome, LuminaError> {
    if let Some(open) = find_open(conn, conversation_id)? {
        return Ok(CreateOutcome::AlreadyOpen(open));
    }
    insert(conn, conversation_id, request, EscalationStatus::Pending, None, at)
        .map(CreateOutcome::Created)
}

/// `pending -> assigned`. Returns false when the escalation was not pending.
pub fn assign(
    conn: &Connection,
    id: &str,
    agent: &str,
    at: DateTime<Utc>,
) -> Result<bool, LuminaError> {
    let changed = conn
        .execute(
            "UPDATE escalations SET status = 'assigned', assignee = ?2, assigned_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![id, agent, fmt_ts(at)],
        )
        .sql()?;
    Ok(changed == 1)
}

/// Change the assignee of an assigned escalation (takeover transfer).
pub fn reassign(
    conn: &Connection,
    id: &str,
    agent: &str,
    at: DateTime<Utc>,
) -> Result<bool, LuminaError> {
    let changed = conn
        .execute(
            "UPDATE escalations SET assignee = ?2, assigned_at = ?3
             WHERE id = ?1 AND status = 'assigned'",
            params![id, agent, fmt_ts(at)],
        )
        .sql()?;
    Ok(changed == 1)
}

/// Resolve an escalation whose status is one of `from`. Returns false otherwise.
pub fn resolve(
    conn: &Connection,
    id: &str,
    from: &[EscalationStatus],
    resolution: &str,
    at: DateTime<Utc>,
) -> Result<bool, LuminaError> {
    let allowed = from
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let changed = conn
        .execute(
            &format!(
                "UPDATE escalations SET status = 'resolved', resolution = ?2, resolved_at = ?3
                 WHERE id = ?1 AND status IN ({allowed})"
            ),
            params![id, resolution, fmt_ts(at)],
        )
        .sql()?;
    Ok(changed == 1)
}

/// Escalations in one of `statuses` created before `cutoff`, oldest first.
pub fn created_before(
    conn: &Connection,
    statuses: &[EscalationStatus],
    cutoff: DateTime<Utc>,
) -> Result<Vec<Escalation>, LuminaError> {
    let allowed = statuses
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalations
             WHERE status IN ({allowed}) AND created_at < ?1
             ORDER BY created_at"
        ))
        .sql()?;
    let rows = stmt
        .query_map(params![fmt_ts(cutoff)], escalation_from_row)
        .sql()?;
    rows.collect::<Result<Vec<_>, _>>().sql()
}

/// Filtered, paginated listing, newest first.
pub fn list(conn: &Connection, filter: &EscalationFilter) -> Result<Page<Escalation>, LuminaError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Box::new(status.to_string()));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority = ?");
        args.push(Box::new(priority.to_string()));
    }
    if let Some(reason) = filter.reason {
        clauses.push("reason = ?");
        args.push(Box::new(reason.to_string()));
    }
    if let Some(assignee) = &filter.assignee {
        clauses.push("assignee = ?");
        args.push(Box::new(assignee.clone()));
    }
    if let Some(from) = filter.from {
        clauses.push("created_at >= ?");
        args.push(Box::new(fmt_ts(from)));
    }
    if let Some(to) = filter.to {
        clauses.push("created_at < ?");
        args.push(Box::new(fmt_ts(to)));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM escalations {where_sql}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )
        .sql()?;

    let per_page = filter.per_page();
    let offset = i64::try_from(filter.offset()).unwrap_or(i64::MAX);
    args.push(Box::new(i64::from(per_page)));
    args.push(Box::new(offset));
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalations {where_sql}
             ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
        ))
        .sql()?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), escalation_from_row)
        .sql()?;
    let items = rows.collect::<Result<Vec<_>, _>>().sql()?;

    Ok(Page {
        items,
        total: u64::try_from(total).unwrap_or(0),
        page: filter.page(),
        per_page,
    })
}

/// Counts by status, reason and priority, plus mean resolution time.
pub fn stats(conn: &Connection) -> Result<EscalationStats, LuminaError> {
    let mut stats = EscalationStats::default();
    for (column, target) in [
        ("status", &mut stats.by_status),
        ("reason", &mut stats.by_reason),
        ("priority", &mut stats.by_priority),
    ] {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {column}, COUNT(*) FROM escalations GROUP BY {column}"
            ))
            .sql()?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .sql()?;
        for row in rows {
            let (key, count) = row.sql()?;
            target.insert(key, u64::try_from(count).unwrap_or(0));
        }
    }
    stats.total = stats.by_status.values().sum();

    let mean_days: Option<f64> = conn
        .query_row(
            "SELECT AVG(julianday(resolved_at) - julianday(created_at))
             FROM escalations WHERE status = 'resolved' AND resolved_at IS NOT NULL",
            [],
            |row| row.get(0),
        )
        .sql()?;
    stats.mean_resolution_minutes = mean_days.map(|d| (d * 24.0 * 60.0 * 100.0).round() / 100.0);
    Ok(stats)
}

/// Delete resolved escalations resolved before `cutoff`. Returns the count.
pub fn purge_resolved_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, LuminaError> {
    conn.execute(
        "DELETE FROM escalations
         WHERE status = 'resolved' AND resolved_at < ?1
           AND id NOT IN (SELECT escalation_id FROM takeover_sessions WHERE escalation_id IS NOT NULL)",
        params![fmt_ts(cutoff)],
    )
    .sql()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::models::now;
    use crate::queries::conversations;
    use lumina_core::{Channel, EscalationReason, Priority};

    fn request(reason: EscalationReason, priority: Priority) -> EscalationRequest {
        EscalationRequest {
            reason,
            priority,
            client_message: Some("quiero hablar con un supervisor".into()),
            automated_reply: Some("Claro".into()),
            confidence: Some(0.8),
        }
    }

    #[tokio::test]
    async fn second_create_returns_the_open_one() {
        let db = Database::open_in_memory().await.unwrap();
        let (first, second) = db
            .write(|tx| {
                let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
                let req = request(EscalationReason::ExplicitClientRequest, Priority::Medium);
                Ok((
                    create_if_absent(tx, &c.id, &req, now())?,
                    create_if_absent(tx, &c.id, &req, now())?,
                ))
            })
            .await
            .unwrap();
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.escalation().id, second.escalation().id);
    }

    #[tokio::test]
    async fn raw_second_insert_is_a_conflict() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db
            .write(|tx| {
                let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
                let req = request(EscalationReason::Complaint, Priority::High);
                insert(tx, &c.id, &req, EscalationStatus::Pending, None, now())?;
                insert(tx, &c.id, &req, EscalationStatus::Assigned, Some("ana"), now())
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn cas_transitions_only_fire_once() {
        let db = Database::open_in_memory().await.unwrap();
        db.write(|tx| {
            let c = conversations::open_or_create(tx, "v", Channel::Web, now())?;
            let req = request(EscalationReason::LowConfidence, Priority::High);
            let e = insert(tx, &c.id, &req, EscalationStatus::Pending, None, now())?;
            assert!(assign(tx, &e.id, "ana", now())?);
            assert!(!assign(tx, &e.id, "luis", now())?);
            let from = [EscalationStatus::Assigned];
            assert!(resolve(tx, &e.id, &from, "listo", now())?);
            assert!(!resolve(tx, &e.id, &from, "otra vez", now())?);
            let stored = get(tx, &e.id)?;
            assert_eq!(stored.assignee.as_deref(), Some("ana"));
            assert_eq!(stored.resolution.as_deref(), Some("listo"));
            assert!(stored.resolved_at.is_some());
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let db = Database::open_in_memory().await.unwrap();
        let (high, page2) = db
            .write(|tx| {
                for i in 0..5 {
                    let c = conversations::open_or_create(tx, &format!("v{i}"), Channel::Web, now())?;
                    let priority = if i % 2 == 0 { Priority::High } else { Priority::Low };
                    insert(
                        tx,
                        &c.id,
                        &request(EscalationReason::LowConfidence, priority),
                        EscalationStatus::Pending,
                        None,
                        now(),
                    )?;
                }
                let high = list(
                    tx,
                    &EscalationFilter {
                        priority: Some(Priority::High),
                        ..Default::default()
                    },
                )?;
                let page2 = list(
                    tx,
                    &EscalationFilter {
                        page: Some(2),
                        per_page: Some(2),
                        ..Default::default()
                    },
                )?;
                Ok((high, page2))
            })
            .await
            .unwrap();
        assert_eq!(high.total, 3);
        assert!(high.items.iter().all(|e| e.priority == Priority::High));
        assert_eq!(page2.total, 5);
        assert_eq!(page2.items.len(), 2);
        assert_eq!(page2.page, 2);
    }

    #[tokio::test]
    async fn stats_count_every_dimension() {
        let db = Database::open_in_memory().await.unwrap();
        let stats = db
            .write(|tx| {
                let a = conversations::open_or_create(tx, "a", Channel::Web, now())?;
                let b = conversations::open_or_create(tx, "b", Channel::Whatsapp, now())?;
                let ea = insert(
                    tx,
                    &a.id,
                    &request(EscalationReason::Complaint, Priority::High),
                    EscalationStatus::Assigned,
                    Some("ana"),
                    now(),
                )?;
                insert(
                    tx,
                    &b.id,
                    &request(EscalationReason::PaymentIssue, Priority::High),
                    EscalationStatus::Pending,
                    None,
                    now(),
                )?;
                resolve(tx, &ea.id, &[EscalationStatus::Assigned], "ok", now())?;
                stats(tx)
            })
            .await
            .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get("resolved"), Some(&1));
        assert_eq!(stats.by_status.get("pending"), Some(&1));
        assert_eq!(stats.by_reason.get("payment_issue"), Some(&1));
        assert_eq!(stats.by_priority.get("high"), Some(&2));
        assert!(stats.mean_resolution_minutes.is_some());
    }
}

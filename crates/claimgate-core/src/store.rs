//! Claim persistence, the append-only event log, and validation attempts.
//!
//! Claims are keyed by id with secondary lookups on `code_id` and on the
//! cycle-uniqueness tuple. A partial unique index over live states backs
//! the engine-level uniqueness check, so duplicate issuers racing past the
//! check still collide in the store. Events and attempts are append-only.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::db::datetime_from_ms;
use crate::error::EngineError;
use crate::model::{
    AttemptOutcome, Claim, ClaimEvent, ClaimEventKind, ClaimPayload, ClaimState,
    ValidationAttempt,
};

/// Inserts a freshly signed claim in Pending state and returns it.
#[allow(clippy::too_many_arguments)]
pub fn insert_claim(
    conn: &Connection,
    employee_id: i64,
    cycle_id: i64,
    benefit_type_id: i64,
    code_id: &str,
    payload: &ClaimPayload,
    signature: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Claim, EngineError> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| EngineError::Internal(format!("payload encoding failed: {e}")))?;
    conn.execute(
        "INSERT INTO claims (employee_id, cycle_id, benefit_type_id, code_id, payload,
                             signature, state, issued_at_ms, expires_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            employee_id,
            cycle_id,
            benefit_type_id,
            code_id,
            payload_json,
            signature,
            ClaimState::Pending.as_str(),
            issued_at.timestamp_millis(),
            expires_at.timestamp_millis(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    claim_by_id(conn, id)?.ok_or_else(|| {
        EngineError::Internal(format!("claim {id} vanished after insert"))
    })
}

/// Loads a claim by id.
pub fn claim_by_id(conn: &Connection, id: i64) -> Result<Option<Claim>, EngineError> {
    let row = conn
        .query_row(
            &format!("{CLAIM_SELECT} WHERE id = ?1"),
            params![id],
            map_claim_row,
        )
        .optional()?;
    row.map(finish_claim).transpose()
}

/// Loads a claim by its opaque code identifier.
pub fn claim_by_code(conn: &Connection, code_id: &str) -> Result<Option<Claim>, EngineError> {
    let row = conn
        .query_row(
            &format!("{CLAIM_SELECT} WHERE code_id = ?1"),
            params![code_id],
            map_claim_row,
        )
        .optional()?;
    row.map(finish_claim).transpose()
}

/// Finds the live claim for a uniqueness tuple, if any.
pub fn live_claim_for(
    conn: &Connection,
    employee_id: i64,
    cycle_id: i64,
    benefit_type_id: i64,
) -> Result<Option<Claim>, EngineError> {
    let row = conn
        .query_row(
            &format!(
                "{CLAIM_SELECT}
                 WHERE employee_id = ?1 AND cycle_id = ?2 AND benefit_type_id = ?3
                   AND state IN ('pending', 'validated', 'delivered')"
            ),
            params![employee_id, cycle_id, benefit_type_id],
            map_claim_row,
        )
        .optional()?;
    row.map(finish_claim).transpose()
}

/// Ids of Pending claims whose TTL has elapsed at `now`; the sweep input.
pub fn pending_expired_ids(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<i64>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM claims
         WHERE state = 'pending' AND expires_at_ms <= ?1
         ORDER BY issued_at_ms ASC",
    )?;
    let ids = stmt
        .query_map(params![now.timestamp_millis()], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Pending -> Validated.
pub fn set_validated(
    conn: &Connection,
    claim_id: i64,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    transition(
        conn,
        claim_id,
        ClaimState::Pending,
        ClaimState::Validated,
        "UPDATE claims SET state = 'validated', validated_at_ms = ?2
         WHERE id = ?1 AND state = 'pending'",
        params![claim_id, at.timestamp_millis()],
    )
}

/// Validated -> Delivered, binding the consumed box.
pub fn set_delivered(
    conn: &Connection,
    claim_id: i64,
    box_id: i64,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    transition(
        conn,
        claim_id,
        ClaimState::Validated,
        ClaimState::Delivered,
        "UPDATE claims SET state = 'delivered', delivered_at_ms = ?2, box_id = ?3
         WHERE id = ?1 AND state = 'validated'",
        params![claim_id, at.timestamp_millis(), box_id],
    )
}

/// Pending -> Expired.
pub fn set_expired(conn: &Connection, claim_id: i64) -> Result<(), EngineError> {
    transition(
        conn,
        claim_id,
        ClaimState::Pending,
        ClaimState::Expired,
        "UPDATE claims SET state = 'expired' WHERE id = ?1 AND state = 'pending'",
        params![claim_id],
    )
}

/// Pending/Validated/Expired -> Cancelled.
pub fn set_cancelled(conn: &Connection, claim_id: i64) -> Result<(), EngineError> {
    let updated = conn.execute(
        "UPDATE claims SET state = 'cancelled'
         WHERE id = ?1 AND state IN ('pending', 'validated', 'expired')",
        params![claim_id],
    )?;
    if updated != 1 {
        return Err(EngineError::Conflict(format!(
            "claim {claim_id} changed state during cancel"
        )));
    }
    Ok(())
}

/// Renews a Pending claim: fresh expiry, fresh signature, and optionally a
/// rotated code id.
pub fn apply_reprint(
    conn: &Connection,
    claim_id: i64,
    code_id: &str,
    payload: &ClaimPayload,
    signature: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), EngineError> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| EngineError::Internal(format!("payload encoding failed: {e}")))?;
    let updated = conn.execute(
        "UPDATE claims
         SET code_id = ?2, payload = ?3, signature = ?4, expires_at_ms = ?5
         WHERE id = ?1 AND state = 'pending'",
        params![
            claim_id,
            code_id,
            payload_json,
            signature,
            expires_at.timestamp_millis()
        ],
    )?;
    if updated != 1 {
        return Err(EngineError::Conflict(format!(
            "claim {claim_id} changed state during reprint"
        )));
    }
    Ok(())
}

/// Sets or clears the soft block on a claim.
pub fn set_claim_blocked(
    conn: &Connection,
    claim_id: i64,
    blocked: bool,
    reason: Option<&str>,
) -> Result<(), EngineError> {
    let updated = conn.execute(
        "UPDATE claims SET blocked = ?2, blocked_reason = ?3 WHERE id = ?1",
        params![claim_id, blocked, reason],
    )?;
    if updated != 1 {
        return Err(EngineError::ClaimNotFound {
            lookup: claim_id.to_string(),
        });
    }
    Ok(())
}

fn transition(
    conn: &Connection,
    claim_id: i64,
    from: ClaimState,
    to: ClaimState,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<(), EngineError> {
    debug_assert!(from.allows(to));
    let updated = conn.execute(sql, params)?;
    if updated != 1 {
        // The guarded predicate failed: the row moved on underneath us.
        return Err(EngineError::Conflict(format!(
            "claim {claim_id} is no longer {from} (wanted {to})"
        )));
    }
    Ok(())
}

/// Appends one event to the claim timeline.
pub fn append_event(
    conn: &Connection,
    claim_id: i64,
    kind: &ClaimEventKind,
    actor_id: &str,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    let metadata = serde_json::to_string(kind)
        .map_err(|e| EngineError::Internal(format!("event encoding failed: {e}")))?;
    conn.execute(
        "INSERT INTO claim_events (claim_id, kind, metadata, actor_id, at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            claim_id,
            kind.token(),
            metadata,
            actor_id,
            at.timestamp_millis()
        ],
    )?;
    Ok(())
}

/// Timeline of a claim, oldest first.
pub fn events_for(conn: &Connection, claim_id: i64) -> Result<Vec<ClaimEvent>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, claim_id, metadata, actor_id, at_ms
         FROM claim_events WHERE claim_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![claim_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut events = Vec::with_capacity(rows.len());
    for (id, claim_id, metadata, actor_id, at_ms) in rows {
        let kind: ClaimEventKind = serde_json::from_str(&metadata)
            .map_err(|e| EngineError::Internal(format!("bad event metadata on {id}: {e}")))?;
        events.push(ClaimEvent {
            id,
            claim_id,
            kind,
            actor_id,
            at: datetime_from_ms(at_ms)?,
        });
    }
    Ok(events)
}

/// Records a validation attempt; written for every scan, rejected or not.
#[allow(clippy::too_many_arguments)]
pub fn record_attempt(
    conn: &Connection,
    claim_id: Option<i64>,
    gatekeeper_id: &str,
    branch_id: &str,
    outcome: AttemptOutcome,
    reason: Option<&str>,
    scanned_code: &str,
    box_label: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO validation_attempts
             (claim_id, gatekeeper_id, branch_id, outcome, reason, scanned_code, box_label, at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            claim_id,
            gatekeeper_id,
            branch_id,
            outcome.as_str(),
            reason,
            scanned_code,
            box_label,
            at.timestamp_millis()
        ],
    )?;
    Ok(())
}

/// Attempts recorded against a claim, oldest first.
pub fn attempts_for(
    conn: &Connection,
    claim_id: i64,
) -> Result<Vec<ValidationAttempt>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, claim_id, gatekeeper_id, branch_id, outcome, reason, scanned_code, box_label, at_ms
         FROM validation_attempts WHERE claim_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![claim_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut attempts = Vec::with_capacity(rows.len());
    for (id, claim_id, gatekeeper_id, branch_id, outcome, reason, scanned_code, box_label, at_ms) in
        rows
    {
        attempts.push(ValidationAttempt {
            id,
            claim_id,
            gatekeeper_id,
            branch_id,
            outcome: AttemptOutcome::parse(&outcome)?,
            reason,
            scanned_code,
            box_label,
            at: datetime_from_ms(at_ms)?,
        });
    }
    Ok(attempts)
}

const CLAIM_SELECT: &str = "SELECT id, employee_id, cycle_id, benefit_type_id, box_id, code_id,
        payload, signature, state, blocked, blocked_reason,
        issued_at_ms, expires_at_ms, validated_at_ms, delivered_at_ms
 FROM claims";

type ClaimRow = (
    i64,
    i64,
    i64,
    i64,
    Option<i64>,
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
    i64,
    i64,
    Option<i64>,
    Option<i64>,
);

fn map_claim_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClaimRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
    ))
}

fn finish_claim(row: ClaimRow) -> Result<Claim, EngineError> {
    let (
        id,
        employee_id,
        cycle_id,
        benefit_type_id,
        box_id,
        code_id,
        payload_json,
        signature,
        state,
        blocked,
        blocked_reason,
        issued_at_ms,
        expires_at_ms,
        validated_at_ms,
        delivered_at_ms,
    ) = row;
    let payload: ClaimPayload = serde_json::from_str(&payload_json)
        .map_err(|e| EngineError::Internal(format!("bad payload on claim {id}: {e}")))?;
    Ok(Claim {
        id,
        employee_id,
        cycle_id,
        benefit_type_id,
        box_id,
        code_id,
        payload,
        signature,
        state: ClaimState::parse(&state)?,
        blocked,
        blocked_reason,
        issued_at: datetime_from_ms(issued_at_ms)?,
        expires_at: datetime_from_ms(expires_at_ms)?,
        validated_at: validated_at_ms.map(datetime_from_ms).transpose()?,
        delivered_at: delivered_at_ms.map(datetime_from_ms).transpose()?,
    })
}

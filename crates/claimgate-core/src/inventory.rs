//! Inventory ledger: physical boxes, branch stock, and movements.
//!
//! Every decrement happens inside the caller's transaction, and the
//! movement row is written before the count update so readers of a
//! committed snapshot see both or neither. Box flips are guarded by a
//! `used = 0` predicate; a row that lost the race surfaces as a conflict
//! rather than a double consumption.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::db::datetime_from_ms;
use crate::error::EngineError;
use crate::model::{Direction, PhysicalBox, StockLevel, StockMovement};

/// Reason token stamped on delivery movements.
const DELIVERY_REASON: &str = "delivery";

/// Counts free boxes of a type at a branch; the issuance stock precheck.
pub fn free_box_count(
    conn: &Connection,
    branch_id: &str,
    box_type: &str,
) -> Result<i64, EngineError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM physical_boxes
         WHERE branch_id = ?1 AND box_type = ?2 AND used = 0",
        params![branch_id, box_type],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Reserves one free box for a claim and consumes it: flips `used`, links
/// the claim, books the outbound movement, and decrements branch stock.
///
/// When `specific_label` is given, that box must be free, of the expected
/// type, and at this branch; otherwise the first free box (lowest id) is
/// picked.
///
/// # Errors
///
/// Returns [`EngineError::NoStock`] when no suitable free box exists, and
/// [`EngineError::Conflict`] if the chosen row was consumed underneath us.
pub fn reserve_and_consume(
    conn: &Connection,
    branch_id: &str,
    box_type: &str,
    claim_id: i64,
    specific_label: Option<&str>,
    actor_id: &str,
    now: DateTime<Utc>,
) -> Result<PhysicalBox, EngineError> {
    let no_stock = || EngineError::NoStock {
        branch_id: branch_id.to_string(),
        box_type: box_type.to_string(),
    };

    let picked = match specific_label {
        Some(label) => conn
            .query_row(
                "SELECT id, label FROM physical_boxes
                 WHERE label = ?1 AND branch_id = ?2 AND box_type = ?3 AND used = 0",
                params![label, branch_id, box_type],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id, label FROM physical_boxes
                 WHERE branch_id = ?1 AND box_type = ?2 AND used = 0
                 ORDER BY id ASC LIMIT 1",
                params![branch_id, box_type],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?,
    };
    let (box_id, label) = picked.ok_or_else(no_stock)?;

    let flipped = conn.execute(
        "UPDATE physical_boxes SET used = 1, claim_id = ?2 WHERE id = ?1 AND used = 0",
        params![box_id, claim_id],
    )?;
    if flipped != 1 {
        return Err(EngineError::Conflict(format!(
            "box {label} consumed concurrently"
        )));
    }

    // Movement first, count second; both commit together.
    conn.execute(
        "INSERT INTO stock_movements (moved_at_ms, branch_id, box_type, direction, quantity, reason, actor_id)
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
        params![
            now.timestamp_millis(),
            branch_id,
            box_type,
            Direction::Out.as_str(),
            DELIVERY_REASON,
            actor_id
        ],
    )?;
    let decremented = conn.execute(
        "UPDATE branch_stock SET count = count - 1
         WHERE branch_id = ?1 AND box_type = ?2 AND count > 0",
        params![branch_id, box_type],
    )?;
    if decremented != 1 {
        return Err(no_stock());
    }

    Ok(PhysicalBox {
        id: box_id,
        label,
        box_type: box_type.to_string(),
        branch_id: branch_id.to_string(),
        used: true,
        claim_id: Some(claim_id),
    })
}

/// Records a justified manual movement and adjusts the stock count.
///
/// # Errors
///
/// Returns [`EngineError::NegativeStock`] when an outbound movement would
/// drive the count below zero.
pub fn record_manual_movement(
    conn: &Connection,
    branch_id: &str,
    box_type: &str,
    direction: Direction,
    quantity: i64,
    reason: &str,
    actor_id: &str,
    now: DateTime<Utc>,
) -> Result<i64, EngineError> {
    if quantity <= 0 {
        return Err(EngineError::Internal(format!(
            "movement quantity must be positive, got {quantity}"
        )));
    }

    conn.execute(
        "INSERT INTO stock_movements (moved_at_ms, branch_id, box_type, direction, quantity, reason, actor_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            now.timestamp_millis(),
            branch_id,
            box_type,
            direction.as_str(),
            quantity,
            reason,
            actor_id
        ],
    )?;

    match direction {
        Direction::In => {
            conn.execute(
                "INSERT INTO branch_stock (branch_id, box_type, count) VALUES (?1, ?2, ?3)
                 ON CONFLICT (branch_id, box_type) DO UPDATE SET count = count + ?3",
                params![branch_id, box_type, quantity],
            )?;
        }
        Direction::Out => {
            let updated = conn.execute(
                "UPDATE branch_stock SET count = count - ?3
                 WHERE branch_id = ?1 AND box_type = ?2 AND count >= ?3",
                params![branch_id, box_type, quantity],
            )?;
            if updated != 1 {
                return Err(EngineError::NegativeStock {
                    branch_id: branch_id.to_string(),
                    box_type: box_type.to_string(),
                });
            }
        }
    }

    let count: i64 = conn.query_row(
        "SELECT count FROM branch_stock WHERE branch_id = ?1 AND box_type = ?2",
        params![branch_id, box_type],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Read-only stock aggregation, optionally scoped to one branch.
pub fn summary(conn: &Connection, branch_id: Option<&str>) -> Result<Vec<StockLevel>, EngineError> {
    let sql = "SELECT s.branch_id, s.box_type, s.count,
                      (SELECT COUNT(*) FROM physical_boxes b
                       WHERE b.branch_id = s.branch_id
                         AND b.box_type = s.box_type AND b.used = 0)
               FROM branch_stock s
               WHERE (?1 IS NULL OR s.branch_id = ?1)
               ORDER BY s.branch_id, s.box_type";
    let mut stmt = conn.prepare(sql)?;
    let levels = stmt
        .query_map(params![branch_id], |row| {
            Ok(StockLevel {
                branch_id: row.get(0)?,
                box_type: row.get(1)?,
                count: row.get(2)?,
                free_boxes: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(levels)
}

/// All movements for a (branch, box type) pair, oldest first.
pub fn movements(
    conn: &Connection,
    branch_id: &str,
    box_type: &str,
) -> Result<Vec<StockMovement>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, moved_at_ms, branch_id, box_type, direction, quantity, reason, actor_id
         FROM stock_movements
         WHERE branch_id = ?1 AND box_type = ?2
         ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![branch_id, box_type], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, moved_at_ms, branch_id, box_type, direction, quantity, reason, actor_id) in rows {
        out.push(StockMovement {
            id,
            moved_at: datetime_from_ms(moved_at_ms)?,
            branch_id,
            box_type,
            direction: Direction::parse(&direction)?,
            quantity,
            reason,
            actor_id,
        });
    }
    Ok(out)
}

/// Loads a physical box by row id.
pub fn box_by_id(conn: &Connection, id: i64) -> Result<Option<PhysicalBox>, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, label, box_type, branch_id, used, claim_id
             FROM physical_boxes WHERE id = ?1",
            params![id],
            |row| {
                Ok(PhysicalBox {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    box_type: row.get(2)?,
                    branch_id: row.get(3)?,
                    used: row.get(4)?,
                    claim_id: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

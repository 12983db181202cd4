//! Loader operations invoked by external collaborators.
//!
//! HR roster import, cycle administration, and box intake are outside the
//! engine proper, but they need a write path that keeps the schema
//! invariants (single active cycle, stock count equal to the movement sum).
//! These functions are that path; scheduling and authorisation stay with
//! the caller.

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};

use crate::error::EngineError;
use crate::model::{ContractCategory, Direction};

/// Inserts or refreshes an employee row, keyed by normalised national id.
/// Returns the roster id.
pub fn upsert_employee(
    conn: &Connection,
    national_id: &str,
    display_name: &str,
    category: ContractCategory,
) -> Result<i64, EngineError> {
    conn.execute(
        "INSERT INTO employees (national_id, display_name, category)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (national_id)
         DO UPDATE SET display_name = excluded.display_name,
                       category = excluded.category",
        params![national_id, display_name, category.as_str()],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM employees WHERE national_id = ?1",
        params![national_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Sets or clears the soft block on an employee.
pub fn set_employee_blocked(
    conn: &Connection,
    employee_id: i64,
    blocked: bool,
) -> Result<(), EngineError> {
    conn.execute(
        "UPDATE employees SET blocked = ?2 WHERE id = ?1",
        params![employee_id, blocked],
    )?;
    Ok(())
}

/// Creates a cycle. Fails if `active` is requested while another cycle is
/// already active (unique partial index).
pub fn upsert_cycle(
    conn: &Connection,
    label: &str,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
    active: bool,
) -> Result<i64, EngineError> {
    conn.execute(
        "INSERT INTO cycles (label, starts_on, ends_on, active)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            label,
            starts_on.to_string(),
            ends_on.to_string(),
            active
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Flips a cycle's active flag.
pub fn set_cycle_active(conn: &Connection, cycle_id: i64, active: bool) -> Result<(), EngineError> {
    conn.execute(
        "UPDATE cycles SET active = ?2 WHERE id = ?1",
        params![cycle_id, active],
    )?;
    Ok(())
}

/// Marks one admitted benefit as the cycle's primary choice.
pub fn set_primary_benefit(
    conn: &Connection,
    cycle_id: i64,
    benefit_type_id: i64,
) -> Result<(), EngineError> {
    conn.execute(
        "UPDATE cycles SET primary_benefit_id = ?2 WHERE id = ?1",
        params![cycle_id, benefit_type_id],
    )?;
    Ok(())
}

/// Creates a benefit type with its eligible contract categories.
pub fn upsert_benefit_type(
    conn: &Connection,
    name: &str,
    requires_gatekeeper: bool,
    box_type: &str,
    eligible: &[ContractCategory],
) -> Result<i64, EngineError> {
    conn.execute(
        "INSERT INTO benefit_types (name, requires_gatekeeper, box_type)
         VALUES (?1, ?2, ?3)",
        params![name, requires_gatekeeper, box_type],
    )?;
    let id = conn.last_insert_rowid();
    for category in eligible {
        conn.execute(
            "INSERT OR IGNORE INTO benefit_categories (benefit_type_id, category)
             VALUES (?1, ?2)",
            params![id, category.as_str()],
        )?;
    }
    Ok(id)
}

/// Admits a benefit type into a cycle.
pub fn admit_benefit(
    conn: &Connection,
    cycle_id: i64,
    benefit_type_id: i64,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT OR IGNORE INTO cycle_benefits (cycle_id, benefit_type_id) VALUES (?1, ?2)",
        params![cycle_id, benefit_type_id],
    )?;
    Ok(())
}

/// Registers labelled physical boxes at a branch and books the matching
/// intake movement, keeping the stock count equal to the movement sum.
pub fn register_boxes(
    conn: &Connection,
    branch_id: &str,
    box_type: &str,
    labels: &[&str],
    actor_id: &str,
) -> Result<(), EngineError> {
    if labels.is_empty() {
        return Ok(());
    }
    for label in labels {
        conn.execute(
            "INSERT INTO physical_boxes (label, box_type, branch_id) VALUES (?1, ?2, ?3)",
            params![label, box_type, branch_id],
        )?;
    }
    let qty = labels.len() as i64;
    conn.execute(
        "INSERT INTO stock_movements (moved_at_ms, branch_id, box_type, direction, quantity, reason, actor_id)
         VALUES (?1, ?2, ?3, ?4, ?5, 'intake', ?6)",
        params![
            Utc::now().timestamp_millis(),
            branch_id,
            box_type,
            Direction::In.as_str(),
            qty,
            actor_id
        ],
    )?;
    conn.execute(
        "INSERT INTO branch_stock (branch_id, box_type, count) VALUES (?1, ?2, ?3)
         ON CONFLICT (branch_id, box_type) DO UPDATE SET count = count + ?3",
        params![branch_id, box_type, qty],
    )?;
    Ok(())
}

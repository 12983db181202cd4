//! Read-only roster and cycle lookups.
//!
//! The roster (employees, cycles, benefit types) is imported by an external
//! HR process; the engine only reads it. Loader functions for that importer
//! live in [`crate::import`].

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::EngineError;
use crate::model::{BenefitType, ContractCategory, Cycle, Employee};

/// Fetches an employee by normalised national id.
pub fn employee_by_national_id(
    conn: &Connection,
    national_id: &str,
) -> Result<Option<Employee>, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, national_id, display_name, category, blocked
             FROM employees WHERE national_id = ?1",
            params![national_id],
            map_employee_row,
        )
        .optional()?;
    row.map(finish_employee).transpose()
}

/// Fetches an employee by roster id.
pub fn employee_by_id(conn: &Connection, id: i64) -> Result<Option<Employee>, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, national_id, display_name, category, blocked
             FROM employees WHERE id = ?1",
            params![id],
            map_employee_row,
        )
        .optional()?;
    row.map(finish_employee).transpose()
}

type EmployeeRow = (i64, String, String, String, bool);

fn map_employee_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmployeeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn finish_employee(
    (id, national_id, display_name, category, blocked): EmployeeRow,
) -> Result<Employee, EngineError> {
    Ok(Employee {
        id,
        national_id,
        display_name,
        category: ContractCategory::parse(&category)?,
        blocked,
    })
}

/// Fetches the cycle currently marked active, if any. The schema enforces
/// at most one.
pub fn active_cycle(conn: &Connection) -> Result<Option<Cycle>, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, label, starts_on, ends_on, active, primary_benefit_id
             FROM cycles WHERE active = 1",
            [],
            map_cycle_row,
        )
        .optional()?;
    row.map(finish_cycle).transpose()
}

/// Fetches a cycle by id.
pub fn cycle_by_id(conn: &Connection, id: i64) -> Result<Option<Cycle>, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, label, starts_on, ends_on, active, primary_benefit_id
             FROM cycles WHERE id = ?1",
            params![id],
            map_cycle_row,
        )
        .optional()?;
    row.map(finish_cycle).transpose()
}

type CycleRow = (i64, String, String, String, bool, Option<i64>);

fn map_cycle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CycleRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_cycle(
    (id, label, starts_on, ends_on, active, primary_benefit_id): CycleRow,
) -> Result<Cycle, EngineError> {
    let parse_day = |s: &str| {
        s.parse()
            .map_err(|_| EngineError::Internal(format!("bad date in cycle {id}: {s}")))
    };
    Ok(Cycle {
        id,
        label,
        starts_on: parse_day(&starts_on)?,
        ends_on: parse_day(&ends_on)?,
        active,
        primary_benefit_id,
    })
}

/// Fetches a benefit type with its eligible categories.
pub fn benefit_type(conn: &Connection, id: i64) -> Result<Option<BenefitType>, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, name, requires_gatekeeper, box_type
             FROM benefit_types WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, requires_gatekeeper, box_type)) = row else {
        return Ok(None);
    };
    Ok(Some(BenefitType {
        id,
        name,
        requires_gatekeeper,
        box_type,
        eligible: eligible_categories(conn, id)?,
    }))
}

/// Benefit types admitted by a cycle, ordered by id.
pub fn admissible_benefits(
    conn: &Connection,
    cycle_id: i64,
) -> Result<Vec<BenefitType>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.name, b.requires_gatekeeper, b.box_type
         FROM benefit_types b
         JOIN cycle_benefits cb ON cb.benefit_type_id = b.id
         WHERE cb.cycle_id = ?1
         ORDER BY b.id ASC",
    )?;
    let rows = stmt
        .query_map(params![cycle_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut benefits = Vec::with_capacity(rows.len());
    for (id, name, requires_gatekeeper, box_type) in rows {
        benefits.push(BenefitType {
            id,
            name,
            requires_gatekeeper,
            box_type,
            eligible: eligible_categories(conn, id)?,
        });
    }
    Ok(benefits)
}

/// Whether the (cycle, benefit) pair is admissible.
pub fn is_admissible(
    conn: &Connection,
    cycle_id: i64,
    benefit_type_id: i64,
) -> Result<bool, EngineError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cycle_benefits WHERE cycle_id = ?1 AND benefit_type_id = ?2",
        params![cycle_id, benefit_type_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn eligible_categories(
    conn: &Connection,
    benefit_type_id: i64,
) -> Result<Vec<ContractCategory>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT category FROM benefit_categories WHERE benefit_type_id = ?1 ORDER BY category",
    )?;
    let tokens = stmt
        .query_map(params![benefit_type_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    tokens
        .iter()
        .map(|t| ContractCategory::parse(t))
        .collect()
}

//! The engine operation surface.
//!
//! Every operation acquires the database connection (honouring the caller's
//! deadline), runs one transaction, and commits the state change together
//! with its claim event and any inventory mutation. Validation additionally
//! writes an audit row for every attempt: rejections roll back the business
//! transaction and then record the attempt (plus lazy expiry or a
//! duplicate-attempt event) in a follow-up transaction under the same
//! connection guard.
//!
//! Administrative operations (cancel, manual stock movements) require an
//! [`AdminCapability`] value minted by the enclosing service after its own
//! role check; the engine is otherwise role-agnostic.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::code;
use crate::config::{EngineConfig, TieBreak};
use crate::db::Database;
use crate::error::EngineError;
use crate::inventory;
use crate::model::{
    AttemptOutcome, BenefitType, Claim, ClaimEvent, ClaimEventKind, ClaimPayload, ClaimState,
    Cycle, Direction, Employee, StockLevel,
};
use crate::national_id;
use crate::roster;
use crate::signer::ClaimSigner;
use crate::store;

/// Target for security-relevant rejections.
const SECURITY_TARGET: &str = "claimgate::security";

/// Capability token for administrative operations.
///
/// The enclosing service performs its role check and mints one of these;
/// the engine only demands its presence.
#[derive(Debug, Clone)]
pub struct AdminCapability {
    actor_id: String,
}

impl AdminCapability {
    /// Mints a capability for the given administrator.
    #[must_use]
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
        }
    }

    /// The administrator this capability was minted for.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

/// Issue operation input.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Raw national id as typed at the kiosk.
    pub employee_id: String,
    /// Explicit cycle; defaults to the active cycle.
    pub cycle_id: Option<i64>,
    /// Branch for the stock precheck; skipped when unknown at issue time.
    pub branch_id: Option<String>,
    /// Deadline for acquiring the store.
    pub deadline: Option<Instant>,
}

/// A claim plus the printable code string shown to the employee.
#[derive(Debug, Clone)]
pub struct IssuedClaim {
    /// The persisted claim.
    pub claim: Claim,
    /// Wire form `<code-id>:<hex-signature>`.
    pub code: String,
}

/// Validate operation input.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// The scanned string, either `<id>:<sig>` or bare `<id>`.
    pub scanned_code: String,
    /// The gatekeeper performing the scan.
    pub gatekeeper_id: String,
    /// The gatekeeper's branch; boxes are reserved here.
    pub branch_id: String,
    /// Specific physical box scanned, if any.
    pub box_code: Option<String>,
    /// Deadline for acquiring the store.
    pub deadline: Option<Instant>,
}

/// Successful validation result.
#[derive(Debug, Clone)]
pub struct DeliveredClaim {
    /// The claim, now Delivered.
    pub claim: Claim,
    /// Label of the box handed over.
    pub box_label: String,
}

/// Claim snapshot returned by the status operation.
#[derive(Debug, Clone)]
pub struct ClaimStatus {
    /// The claim as stored.
    pub claim: Claim,
    /// Whole seconds until expiry; zero once elapsed.
    pub seconds_to_expiry: i64,
    /// Full event timeline, oldest first.
    pub events: Vec<ClaimEvent>,
}

/// The signed-claim lifecycle engine.
pub struct Engine {
    db: Database,
    signer: ClaimSigner,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    /// Builds an engine over an opened database.
    #[must_use]
    pub fn new(db: Database, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let signer = ClaimSigner::new(config.secret_bytes());
        Self {
            db,
            signer,
            clock,
            config,
        }
    }

    /// The underlying database handle, for collaborator write paths
    /// (roster import, box intake) and read-only reporting.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // === Issuance (kiosk side) ===

    /// Creates a pending claim for an eligible employee.
    ///
    /// Idempotent on the (employee, cycle, benefit) tuple: a live claim
    /// surfaces as [`EngineError::AlreadyIssued`] carrying that claim.
    ///
    /// # Errors
    ///
    /// See the operation table: `IdMalformed`, `EmployeeNotFound`,
    /// `EmployeeBlocked`, `NoActiveCycle`, `CycleNotCurrent`,
    /// `NoEligibleBenefit`, `NoStock`, `AlreadyIssued`, plus `Timeout` /
    /// `Conflict` / `Internal` from the store.
    pub fn issue(&self, req: &IssueRequest) -> Result<IssuedClaim, EngineError> {
        let national_id = national_id::normalize(&req.employee_id)
            .map_err(|e| EngineError::IdMalformed {
                reason: e.to_string(),
            })?;
        let now = self.clock.now();

        let mut conn = self.db.acquire(req.deadline)?;
        let tx = conn.transaction()?;

        let employee = roster::employee_by_national_id(&tx, &national_id)?
            .ok_or(EngineError::EmployeeNotFound { national_id })?;
        if employee.blocked {
            return Err(EngineError::EmployeeBlocked {
                employee_id: employee.id,
            });
        }

        let cycle = self.resolve_cycle(&tx, req.cycle_id, now)?;
        let benefit = self.resolve_benefit(&tx, &employee, &cycle)?;

        if let Some(existing) =
            store::live_claim_for(&tx, employee.id, cycle.id, benefit.id)?
        {
            return Err(EngineError::AlreadyIssued {
                claim: Box::new(existing),
            });
        }

        // Soft precheck: delivery reserves the box, not issuance, so a
        // TTL-bounded window never holds inventory.
        if let Some(branch_id) = req.branch_id.as_deref() {
            if inventory::free_box_count(&tx, branch_id, &benefit.box_type)? == 0 {
                return Err(EngineError::NoStock {
                    branch_id: branch_id.to_string(),
                    box_type: benefit.box_type.clone(),
                });
            }
        }

        let code_id = code::generate_code_id(self.config.code_length_bits);
        let payload = ClaimPayload {
            benefit_type_id: benefit.id,
            code_id: code_id.clone(),
            cycle_id: cycle.id,
            employee_id: employee.id,
            issued_at_unix: now.timestamp(),
        };
        let signature = self.signer.sign(&payload);
        let expires_at = now + self.config.claim_ttl();

        let claim = store::insert_claim(
            &tx,
            employee.id,
            cycle.id,
            benefit.id,
            &code_id,
            &payload,
            &signature,
            now,
            expires_at,
        )?;
        store::append_event(&tx, claim.id, &ClaimEventKind::Issued, &employee.national_id, now)?;
        tx.commit()?;

        info!(
            claim_id = claim.id,
            employee_id = employee.id,
            cycle_id = cycle.id,
            benefit_type_id = benefit.id,
            "claim issued"
        );
        Ok(IssuedClaim {
            code: code::render(&claim.code_id, &claim.signature),
            claim,
        })
    }

    fn resolve_cycle(
        &self,
        conn: &Connection,
        cycle_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Cycle, EngineError> {
        let cycle = match cycle_id {
            Some(id) => roster::cycle_by_id(conn, id)?.ok_or(EngineError::NoActiveCycle)?,
            None => roster::active_cycle(conn)?.ok_or(EngineError::NoActiveCycle)?,
        };
        if !cycle.active {
            return Err(EngineError::CycleNotCurrent { cycle_id: cycle.id });
        }
        if self.config.cycle_active_window_check && !cycle.contains(now.date_naive()) {
            return Err(EngineError::CycleNotCurrent { cycle_id: cycle.id });
        }
        Ok(cycle)
    }

    fn resolve_benefit(
        &self,
        conn: &Connection,
        employee: &Employee,
        cycle: &Cycle,
    ) -> Result<BenefitType, EngineError> {
        let mut eligible: Vec<BenefitType> = roster::admissible_benefits(conn, cycle.id)?
            .into_iter()
            .filter(|b| b.eligible_for(employee.category))
            .collect();
        if eligible.is_empty() {
            return Err(EngineError::NoEligibleBenefit {
                employee_id: employee.id,
                cycle_id: cycle.id,
            });
        }
        let chosen = match self.config.benefit_tie_break {
            TieBreak::CyclePrimary => cycle
                .primary_benefit_id
                .and_then(|primary| eligible.iter().position(|b| b.id == primary))
                .unwrap_or(0),
            TieBreak::LowestId => 0, // admissible_benefits orders by id
        };
        Ok(eligible.swap_remove(chosen))
    }

    // === Validation (gatekeeper side) ===

    /// Validates a scanned code and delivers a physical box, in one
    /// transaction. Exactly one of two concurrent calls for the same code
    /// succeeds; the loser observes the committed post-transition state.
    ///
    /// Every attempt, rejected or not, leaves a `ValidationAttempt` row.
    ///
    /// # Errors
    ///
    /// See the operation table: `CodeMalformed`, `ClaimNotFound`,
    /// `SignatureInvalid`, `Expired`, `AlreadyValidated`,
    /// `AlreadyDelivered`, `EmployeeBlocked`, `NoStock`, `Forbidden`, plus
    /// `Timeout` / `Conflict` / `Internal` from the store.
    pub fn validate(&self, req: &ValidateRequest) -> Result<DeliveredClaim, EngineError> {
        let now = self.clock.now();
        let mut conn = self.db.acquire(req.deadline)?;

        let parsed = match code::parse_scanned(&req.scanned_code) {
            Ok(parsed) => parsed,
            Err(err) => {
                store::record_attempt(
                    &conn,
                    None,
                    &req.gatekeeper_id,
                    &req.branch_id,
                    AttemptOutcome::Rejected,
                    Some(err.token()),
                    &req.scanned_code,
                    req.box_code.as_deref(),
                    now,
                )?;
                return Err(err);
            }
        };

        match self.validate_tx(&mut conn, &parsed.code_id, parsed.signature.as_deref(), req, now) {
            Ok(delivered) => {
                info!(
                    claim_id = delivered.claim.id,
                    gatekeeper_id = %req.gatekeeper_id,
                    branch_id = %req.branch_id,
                    box_label = %delivered.box_label,
                    "claim delivered"
                );
                Ok(delivered)
            }
            Err(err) => {
                self.record_rejection(&mut conn, &parsed.code_id, req, &err, now)?;
                Err(err)
            }
        }
    }

    /// The main validation transaction; any error rolls the whole thing
    /// back, including a partially completed box reservation.
    fn validate_tx(
        &self,
        conn: &mut Connection,
        code_id: &str,
        presented_signature: Option<&str>,
        req: &ValidateRequest,
        now: DateTime<Utc>,
    ) -> Result<DeliveredClaim, EngineError> {
        let tx = conn.transaction()?;

        let claim = store::claim_by_code(&tx, code_id)?.ok_or_else(|| {
            EngineError::ClaimNotFound {
                lookup: code_id.to_string(),
            }
        })?;

        // Constant-time signature check against the wire signature when
        // the long form was scanned, else against the stored one (which
        // also guards tampering at rest).
        let presented = presented_signature.unwrap_or(&claim.signature);
        if !self.signer.verify(&claim.payload, presented) {
            return Err(EngineError::SignatureInvalid {
                code_id: code_id.to_string(),
            });
        }

        if claim.is_expired_at(now) {
            return Err(EngineError::Expired {
                claim_id: claim.id,
                expires_at: claim.expires_at,
            });
        }

        match claim.state {
            ClaimState::Pending => {}
            ClaimState::Validated => {
                return Err(EngineError::AlreadyValidated { claim_id: claim.id });
            }
            ClaimState::Delivered => {
                return Err(EngineError::AlreadyDelivered { claim_id: claim.id });
            }
            ClaimState::Expired => {
                return Err(EngineError::Expired {
                    claim_id: claim.id,
                    expires_at: claim.expires_at,
                });
            }
            ClaimState::Cancelled => {
                return Err(EngineError::InvalidState {
                    claim_id: claim.id,
                    state: claim.state,
                    operation: "validate",
                });
            }
        }

        if claim.blocked {
            return Err(EngineError::Forbidden {
                reason: claim
                    .blocked_reason
                    .clone()
                    .unwrap_or_else(|| "claim blocked".to_string()),
            });
        }
        let employee = roster::employee_by_id(&tx, claim.employee_id)?.ok_or_else(|| {
            EngineError::Internal(format!("claim {} references missing employee", claim.id))
        })?;
        if employee.blocked {
            return Err(EngineError::EmployeeBlocked {
                employee_id: employee.id,
            });
        }
        let cycle = roster::cycle_by_id(&tx, claim.cycle_id)?.ok_or_else(|| {
            EngineError::Internal(format!("claim {} references missing cycle", claim.id))
        })?;
        if !cycle.active {
            return Err(EngineError::CycleNotCurrent { cycle_id: cycle.id });
        }
        let benefit = roster::benefit_type(&tx, claim.benefit_type_id)?.ok_or_else(|| {
            EngineError::Internal(format!("claim {} references missing benefit", claim.id))
        })?;
        if !benefit.requires_gatekeeper {
            return Err(EngineError::Forbidden {
                reason: format!("benefit {} does not use gatekeeper validation", benefit.id),
            });
        }
        if req.box_code.is_none() && !self.config.auto_pick_box_on_validate {
            return Err(EngineError::Forbidden {
                reason: "a physical box code is required at this branch".to_string(),
            });
        }

        store::set_validated(&tx, claim.id, now)?;
        store::append_event(
            &tx,
            claim.id,
            &ClaimEventKind::Validated {
                gatekeeper_id: req.gatekeeper_id.clone(),
            },
            &req.gatekeeper_id,
            now,
        )?;

        let picked = inventory::reserve_and_consume(
            &tx,
            &req.branch_id,
            &benefit.box_type,
            claim.id,
            req.box_code.as_deref(),
            &req.gatekeeper_id,
            now,
        )?;

        store::set_delivered(&tx, claim.id, picked.id, now)?;
        store::append_event(
            &tx,
            claim.id,
            &ClaimEventKind::Delivered {
                gatekeeper_id: req.gatekeeper_id.clone(),
                box_label: picked.label.clone(),
            },
            &req.gatekeeper_id,
            now,
        )?;
        store::record_attempt(
            &tx,
            Some(claim.id),
            &req.gatekeeper_id,
            &req.branch_id,
            AttemptOutcome::Success,
            None,
            &req.scanned_code,
            Some(&picked.label),
            now,
        )?;

        let claim = store::claim_by_id(&tx, claim.id)?.ok_or_else(|| {
            EngineError::Internal(format!("claim {} vanished mid-delivery", claim.id))
        })?;
        tx.commit()?;

        Ok(DeliveredClaim {
            claim,
            box_label: picked.label,
        })
    }

    /// Persists the audit trail of a rejected attempt after the business
    /// transaction rolled back: the attempt row, a lazy Pending -> Expired
    /// transition, and a duplicate-attempt event where applicable.
    fn record_rejection(
        &self,
        conn: &mut Connection,
        code_id: &str,
        req: &ValidateRequest,
        err: &EngineError,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if matches!(
            err,
            EngineError::SignatureInvalid { .. } | EngineError::Forbidden { .. }
        ) {
            warn!(
                target: SECURITY_TARGET,
                code_id = %code_id,
                gatekeeper_id = %req.gatekeeper_id,
                branch_id = %req.branch_id,
                reason = err.token(),
                "validation rejected"
            );
        } else {
            warn!(
                code_id = %code_id,
                gatekeeper_id = %req.gatekeeper_id,
                reason = err.token(),
                "validation rejected"
            );
        }

        let tx = conn.transaction()?;
        let claim = store::claim_by_code(&tx, code_id)?;
        let claim_id = claim.as_ref().map(|c| c.id);

        if let Some(claim) = &claim {
            match err {
                EngineError::Expired { .. } if claim.state == ClaimState::Pending => {
                    store::set_expired(&tx, claim.id)?;
                    store::append_event(
                        &tx,
                        claim.id,
                        &ClaimEventKind::Expired { swept: false },
                        &req.gatekeeper_id,
                        now,
                    )?;
                }
                EngineError::AlreadyValidated { .. }
                | EngineError::AlreadyDelivered { .. }
                | EngineError::InvalidState { .. } => {
                    store::append_event(
                        &tx,
                        claim.id,
                        &ClaimEventKind::DuplicateAttempt {
                            gatekeeper_id: req.gatekeeper_id.clone(),
                            observed_state: claim.state,
                        },
                        &req.gatekeeper_id,
                        now,
                    )?;
                }
                _ => {}
            }
        }

        store::record_attempt(
            &tx,
            claim_id,
            &req.gatekeeper_id,
            &req.branch_id,
            AttemptOutcome::Rejected,
            Some(err.token()),
            &req.scanned_code,
            req.box_code.as_deref(),
            now,
        )?;
        tx.commit()?;
        Ok(())
    }

    // === Status, reprint, cancel ===

    /// Claim snapshot plus timeline, looked up by code id, wire form, or
    /// numeric claim id.
    ///
    /// # Errors
    ///
    /// Returns `ClaimNotFound` when nothing matches.
    pub fn get_status(&self, lookup: &str) -> Result<ClaimStatus, EngineError> {
        let now = self.clock.now();
        let conn = self.db.acquire(None)?;

        let claim = if let Ok(id) = lookup.trim().parse::<i64>() {
            store::claim_by_id(&conn, id)?
        } else {
            let parsed = code::parse_scanned(lookup)?;
            store::claim_by_code(&conn, &parsed.code_id)?
        };
        let claim = claim.ok_or_else(|| EngineError::ClaimNotFound {
            lookup: lookup.to_string(),
        })?;

        let events = store::events_for(&conn, claim.id)?;
        let seconds_to_expiry = (claim.expires_at - now).num_seconds().max(0);
        Ok(ClaimStatus {
            claim,
            seconds_to_expiry,
            events,
        })
    }

    /// Renews a Pending claim's TTL and signature at the kiosk.
    ///
    /// The code identifier is kept stable unless `reprint_rotates_code` is
    /// configured, preserving the external identifier on the first print.
    ///
    /// # Errors
    ///
    /// Returns `ClaimNotFound` or `InvalidState` (only Pending claims can
    /// be reprinted).
    pub fn reprint(
        &self,
        claim_id: i64,
        reason: &str,
        actor_id: &str,
    ) -> Result<IssuedClaim, EngineError> {
        let now = self.clock.now();
        let mut conn = self.db.acquire(None)?;
        let tx = conn.transaction()?;

        let claim = store::claim_by_id(&tx, claim_id)?.ok_or_else(|| {
            EngineError::ClaimNotFound {
                lookup: claim_id.to_string(),
            }
        })?;
        if claim.state != ClaimState::Pending {
            return Err(EngineError::InvalidState {
                claim_id,
                state: claim.state,
                operation: "reprint",
            });
        }

        let code_id = if self.config.reprint_rotates_code {
            code::generate_code_id(self.config.code_length_bits)
        } else {
            claim.code_id.clone()
        };
        let payload = ClaimPayload {
            benefit_type_id: claim.benefit_type_id,
            code_id: code_id.clone(),
            cycle_id: claim.cycle_id,
            employee_id: claim.employee_id,
            issued_at_unix: now.timestamp(),
        };
        let signature = self.signer.sign(&payload);
        let expires_at = now + self.config.claim_ttl();

        store::apply_reprint(&tx, claim_id, &code_id, &payload, &signature, expires_at)?;
        store::append_event(
            &tx,
            claim_id,
            &ClaimEventKind::Reprinted {
                reason: reason.to_string(),
            },
            actor_id,
            now,
        )?;

        let claim = store::claim_by_id(&tx, claim_id)?.ok_or_else(|| {
            EngineError::Internal(format!("claim {claim_id} vanished mid-reprint"))
        })?;
        tx.commit()?;

        info!(claim_id, "claim reprinted");
        Ok(IssuedClaim {
            code: code::render(&claim.code_id, &claim.signature),
            claim,
        })
    }

    /// Administratively cancels a claim.
    ///
    /// A box already reserved by a Validated claim is NOT returned to
    /// stock; a compensating manual movement must be recorded.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without a capability, `ClaimNotFound`, or
    /// `InvalidState` for Delivered/Cancelled claims.
    pub fn cancel(
        &self,
        claim_id: i64,
        reason: &str,
        admin: Option<&AdminCapability>,
    ) -> Result<Claim, EngineError> {
        let admin = admin.ok_or_else(|| EngineError::Forbidden {
            reason: "cancel requires an admin capability".to_string(),
        })?;
        let now = self.clock.now();
        let mut conn = self.db.acquire(None)?;
        let tx = conn.transaction()?;

        let claim = store::claim_by_id(&tx, claim_id)?.ok_or_else(|| {
            EngineError::ClaimNotFound {
                lookup: claim_id.to_string(),
            }
        })?;
        if !claim.state.allows(ClaimState::Cancelled) {
            return Err(EngineError::InvalidState {
                claim_id,
                state: claim.state,
                operation: "cancel",
            });
        }

        store::set_cancelled(&tx, claim_id)?;
        store::append_event(
            &tx,
            claim_id,
            &ClaimEventKind::Cancelled {
                reason: reason.to_string(),
            },
            admin.actor_id(),
            now,
        )?;
        let claim = store::claim_by_id(&tx, claim_id)?.ok_or_else(|| {
            EngineError::Internal(format!("claim {claim_id} vanished mid-cancel"))
        })?;
        tx.commit()?;

        info!(claim_id, actor_id = admin.actor_id(), "claim cancelled");
        Ok(claim)
    }

    /// Sets or clears the soft block on a claim. Admin-only. A blocked
    /// claim keeps its state but is rejected at validation.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without a capability or `ClaimNotFound`.
    pub fn block_claim(
        &self,
        claim_id: i64,
        blocked: bool,
        reason: Option<&str>,
        admin: Option<&AdminCapability>,
    ) -> Result<(), EngineError> {
        let admin = admin.ok_or_else(|| EngineError::Forbidden {
            reason: "blocking a claim requires an admin capability".to_string(),
        })?;
        let conn = self.db.acquire(None)?;
        store::set_claim_blocked(&conn, claim_id, blocked, reason)?;
        info!(claim_id, blocked, actor_id = admin.actor_id(), "claim block updated");
        Ok(())
    }

    // === Janitorial and inventory surface ===

    /// Transitions every Pending claim past its TTL to Expired. Invoked by
    /// an external janitor; idempotent (a second immediate run sweeps 0).
    ///
    /// # Errors
    ///
    /// Only storage errors.
    pub fn sweep_expired(&self) -> Result<u64, EngineError> {
        let now = self.clock.now();
        let mut conn = self.db.acquire(None)?;
        let tx = conn.transaction()?;

        let ids = store::pending_expired_ids(&tx, now)?;
        for &claim_id in &ids {
            store::set_expired(&tx, claim_id)?;
            store::append_event(
                &tx,
                claim_id,
                &ClaimEventKind::Expired { swept: true },
                "sweep",
                now,
            )?;
        }
        tx.commit()?;

        let count = ids.len() as u64;
        if count > 0 {
            info!(count, "expired claims swept");
        }
        Ok(count)
    }

    /// Records a justified manual stock movement. Admin-only.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` without a capability or `NegativeStock` when an
    /// outbound movement would underflow.
    pub fn record_stock_movement(
        &self,
        branch_id: &str,
        box_type: &str,
        direction: Direction,
        quantity: i64,
        reason: &str,
        admin: Option<&AdminCapability>,
    ) -> Result<i64, EngineError> {
        let admin = admin.ok_or_else(|| EngineError::Forbidden {
            reason: "stock movements require an admin capability".to_string(),
        })?;
        let now = self.clock.now();
        let mut conn = self.db.acquire(None)?;
        let tx = conn.transaction()?;
        let count = inventory::record_manual_movement(
            &tx,
            branch_id,
            box_type,
            direction,
            quantity,
            reason,
            admin.actor_id(),
            now,
        )?;
        tx.commit()?;
        Ok(count)
    }

    /// Read-only stock aggregation, optionally scoped to one branch.
    ///
    /// # Errors
    ///
    /// Only storage errors.
    pub fn stock_summary(&self, branch_id: Option<&str>) -> Result<Vec<StockLevel>, EngineError> {
        let conn = self.db.acquire(None)?;
        inventory::summary(&conn, branch_id)
    }
}

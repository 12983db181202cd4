//! Engine error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Claim, ClaimState};

/// Errors surfaced by the engine operation surface.
///
/// The variants fall into the classes the enclosing service cares about:
/// malformed input, not-found, security, lifecycle, and resource. Lifecycle
/// rejections (`AlreadyValidated`, `AlreadyDelivered`, `AlreadyIssued`,
/// `Expired`) are expected under normal concurrent use and must stay
/// distinguishable so the gate UI can explain the situation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The national identifier failed normalisation or its checksum.
    #[error("malformed national id: {reason}")]
    IdMalformed {
        /// Why normalisation rejected the input.
        reason: String,
    },

    /// The scanned code string could not be parsed into a code identifier.
    #[error("malformed claim code")]
    CodeMalformed,

    /// No claim matches the given code or claim id.
    #[error("claim not found: {lookup}")]
    ClaimNotFound {
        /// The code id or claim id that was looked up.
        lookup: String,
    },

    /// No employee with the given normalised national id.
    #[error("employee not found: {national_id}")]
    EmployeeNotFound {
        /// The normalised national id.
        national_id: String,
    },

    /// The employee is soft-blocked and may not issue or collect claims.
    #[error("employee {employee_id} is blocked")]
    EmployeeBlocked {
        /// The blocked employee.
        employee_id: i64,
    },

    /// No cycle is currently marked active.
    #[error("no active cycle")]
    NoActiveCycle,

    /// The resolved cycle is inactive or its window does not contain today.
    #[error("cycle {cycle_id} is not current")]
    CycleNotCurrent {
        /// The cycle that failed the check.
        cycle_id: i64,
    },

    /// The cycle admits no benefit type matching the employee's category.
    #[error("no eligible benefit for employee {employee_id} in cycle {cycle_id}")]
    NoEligibleBenefit {
        /// The employee.
        employee_id: i64,
        /// The cycle.
        cycle_id: i64,
    },

    /// A live claim already exists for this (employee, cycle, benefit).
    ///
    /// Carries the existing claim so the caller can treat issuance as
    /// idempotent on the uniqueness tuple.
    #[error("claim {} already issued for this employee, cycle, and benefit", claim.id)]
    AlreadyIssued {
        /// The pre-existing claim.
        claim: Box<Claim>,
    },

    /// No free physical box of the requested type at the branch.
    #[error("no stock of box type {box_type} at branch {branch_id}")]
    NoStock {
        /// The branch.
        branch_id: String,
        /// The requested box type.
        box_type: String,
    },

    /// A manual movement would drive the stock count below zero.
    #[error("stock of {box_type} at {branch_id} would drop below zero")]
    NegativeStock {
        /// The branch.
        branch_id: String,
        /// The box type.
        box_type: String,
    },

    /// The scanned signature does not match the stored payload.
    #[error("signature verification failed for code {code_id}")]
    SignatureInvalid {
        /// The code id whose signature failed.
        code_id: String,
    },

    /// The claim was already validated by another gatekeeper.
    #[error("claim {claim_id} is already validated")]
    AlreadyValidated {
        /// The claim.
        claim_id: i64,
    },

    /// The claim was already delivered.
    #[error("claim {claim_id} is already delivered")]
    AlreadyDelivered {
        /// The claim.
        claim_id: i64,
    },

    /// The claim's TTL has elapsed.
    #[error("claim {claim_id} expired at {expires_at}")]
    Expired {
        /// The claim.
        claim_id: i64,
        /// The expiry instant (half-open upper bound).
        expires_at: DateTime<Utc>,
    },

    /// The requested transition is not allowed from the claim's state.
    #[error("claim {claim_id} in state {state} does not allow {operation}")]
    InvalidState {
        /// The claim.
        claim_id: i64,
        /// The current state.
        state: ClaimState,
        /// The attempted operation.
        operation: &'static str,
    },

    /// The operation requires an admin capability that was not supplied,
    /// or validation was attempted on a benefit that does not use
    /// gatekeeper validation.
    #[error("operation forbidden: {reason}")]
    Forbidden {
        /// Why the operation was refused.
        reason: String,
    },

    /// The caller's deadline elapsed while waiting for the store lock.
    #[error("deadline exceeded waiting for the claim store")]
    Timeout,

    /// The storage transaction aborted; safe to retry with the same inputs.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Unexpected failure; details go to the log, not the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Short machine-readable token recorded on validation attempts and
    /// used as the `reason` field of audit rows.
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            Self::IdMalformed { .. } => "id_malformed",
            Self::CodeMalformed => "code_malformed",
            Self::ClaimNotFound { .. } => "claim_not_found",
            Self::EmployeeNotFound { .. } => "employee_not_found",
            Self::EmployeeBlocked { .. } => "employee_blocked",
            Self::NoActiveCycle => "no_active_cycle",
            Self::CycleNotCurrent { .. } => "cycle_not_current",
            Self::NoEligibleBenefit { .. } => "no_eligible_benefit",
            Self::AlreadyIssued { .. } => "already_issued",
            Self::NoStock { .. } => "no_stock",
            Self::NegativeStock { .. } => "negative_stock",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::AlreadyValidated { .. } => "already_validated",
            Self::AlreadyDelivered { .. } => "already_delivered",
            Self::Expired { .. } => "expired",
            Self::InvalidState { .. } => "invalid_state",
            Self::Forbidden { .. } => "forbidden",
            Self::Timeout => "timeout",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Conflict(err.to_string())
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}

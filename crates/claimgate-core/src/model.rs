//! Domain records and the claim state machine.
//!
//! # Claim lifecycle
//!
//! ```text
//!          issue                    validate                  deliver
//!   (none) ------> Pending --------------------> Validated ---------> Delivered
//!                    |                               |
//!                    | expire-sweep                  | cancel (admin)
//!                    v                               v
//!                 Expired                         Cancelled
//!                    | cancel (admin)
//!                    v
//!                 Cancelled
//! ```
//!
//! Delivered, Expired-then-Cancelled, and Cancelled are terminal; every
//! transition is checked by [`ClaimState::allows`] before any row is
//! touched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Contract category of an employee; the closed set benefit eligibility is
/// defined over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ContractCategory {
    /// Open-ended contract.
    Permanent,
    /// Fixed-term contract.
    FixedTerm,
    /// Part-time contract.
    PartTime,
    /// Fee-based engagement.
    Fee,
    /// External collaborator.
    External,
}

impl ContractCategory {
    /// Stable storage token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::FixedTerm => "fixed_term",
            Self::PartTime => "part_time",
            Self::Fee => "fee",
            Self::External => "external",
        }
    }

    /// Parses a storage token.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on an unrecognised token; categories only enter
    /// storage through [`Self::as_str`].
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "permanent" => Ok(Self::Permanent),
            "fixed_term" => Ok(Self::FixedTerm),
            "part_time" => Ok(Self::PartTime),
            "fee" => Ok(Self::Fee),
            "external" => Ok(Self::External),
            other => Err(EngineError::Internal(format!(
                "unrecognised contract category: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ContractCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An employee on the imported roster. Never deleted; `blocked` soft-locks
/// both issuance and validation.
#[derive(Debug, Clone, Serialize)]
pub struct Employee {
    /// Stable roster id.
    pub id: i64,
    /// Normalised national id, unique.
    pub national_id: String,
    /// Display name for receipts and logs.
    pub display_name: String,
    /// Contract category.
    pub category: ContractCategory,
    /// Soft block flag.
    pub blocked: bool,
}

/// An administratively defined collection window.
#[derive(Debug, Clone, Serialize)]
pub struct Cycle {
    /// Cycle id.
    pub id: i64,
    /// Human label, e.g. `C7`.
    pub label: String,
    /// First day of the window (inclusive).
    pub starts_on: NaiveDate,
    /// Last day of the window (inclusive).
    pub ends_on: NaiveDate,
    /// Whether this is the active cycle. At most one cycle is active.
    pub active: bool,
    /// Benefit preferred when an employee is eligible for several.
    pub primary_benefit_id: Option<i64>,
}

impl Cycle {
    /// Whether the window contains the given day.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.starts_on <= day && day <= self.ends_on
    }
}

/// Policy object describing what is collected and by whom.
#[derive(Debug, Clone, Serialize)]
pub struct BenefitType {
    /// Benefit id.
    pub id: i64,
    /// Human name.
    pub name: String,
    /// Whether collection goes through a gatekeeper scan.
    pub requires_gatekeeper: bool,
    /// Physical box type consumed on delivery.
    pub box_type: String,
    /// Contract categories eligible for this benefit.
    pub eligible: Vec<ContractCategory>,
}

impl BenefitType {
    /// Whether the contract category is in the eligible set.
    #[must_use]
    pub fn eligible_for(&self, category: ContractCategory) -> bool {
        self.eligible.contains(&category)
    }
}

/// A uniquely labelled physical unit of inventory at a branch.
#[derive(Debug, Clone, Serialize)]
pub struct PhysicalBox {
    /// Box row id.
    pub id: i64,
    /// Printed label, e.g. `BOX-017`.
    pub label: String,
    /// Box type tag.
    pub box_type: String,
    /// Branch holding the box.
    pub branch_id: String,
    /// Flips false -> true exactly once, inside a successful validation.
    pub used: bool,
    /// The claim that consumed the box; immutable once set.
    pub claim_id: Option<i64>,
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Stock added.
    In,
    /// Stock removed.
    Out,
}

impl Direction {
    /// Stable storage token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    /// Parses a storage token.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on an unrecognised token.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => Err(EngineError::Internal(format!(
                "unrecognised movement direction: {other}"
            ))),
        }
    }
}

/// One append-only inventory movement.
#[derive(Debug, Clone, Serialize)]
pub struct StockMovement {
    /// Movement id.
    pub id: i64,
    /// When the movement was recorded.
    pub moved_at: DateTime<Utc>,
    /// Branch.
    pub branch_id: String,
    /// Box type.
    pub box_type: String,
    /// Direction.
    pub direction: Direction,
    /// Quantity moved, always positive.
    pub quantity: i64,
    /// Justification.
    pub reason: String,
    /// Who recorded it.
    pub actor_id: String,
}

/// Stock level for one (branch, box type) pair.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    /// Branch.
    pub branch_id: String,
    /// Box type.
    pub box_type: String,
    /// Counted stock.
    pub count: i64,
    /// Free (unused) physical boxes currently registered.
    pub free_boxes: i64,
}

/// Lifecycle state of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ClaimState {
    /// Issued, waiting for a gatekeeper scan.
    Pending,
    /// Scanned and verified; box reservation in flight.
    Validated,
    /// Handed over; terminal.
    Delivered,
    /// TTL elapsed before validation.
    Expired,
    /// Administratively cancelled; terminal.
    Cancelled,
}

impl ClaimState {
    /// Stable storage token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Delivered => "delivered",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a storage token.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on an unrecognised token.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "pending" => Ok(Self::Pending),
            "validated" => Ok(Self::Validated),
            "delivered" => Ok(Self::Delivered),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Internal(format!(
                "unrecognised claim state: {other}"
            ))),
        }
    }

    /// Whether no further state-changing operation is accepted.
    ///
    /// Expired still admits an admin cancel, so it is not fully terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether this state counts against cycle uniqueness.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Validated | Self::Delivered)
    }

    /// Whether the state machine allows moving to `next`.
    #[must_use]
    pub fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Validated | Self::Expired | Self::Cancelled)
                | (Self::Validated, Self::Delivered | Self::Cancelled)
                | (Self::Expired, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for ClaimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record the signature covers. Field order matches the canonical
/// (sorted-key) encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimPayload {
    /// Benefit type.
    pub benefit_type_id: i64,
    /// Opaque code identifier bound into the signature.
    pub code_id: String,
    /// Cycle.
    pub cycle_id: i64,
    /// Employee.
    pub employee_id: i64,
    /// Issue instant, Unix seconds.
    pub issued_at_unix: i64,
}

/// A signed authorisation for one employee to collect one benefit in one
/// cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Claim {
    /// Claim id.
    pub id: i64,
    /// Owning employee.
    pub employee_id: i64,
    /// Cycle.
    pub cycle_id: i64,
    /// Benefit type.
    pub benefit_type_id: i64,
    /// Physical box consumed on delivery.
    pub box_id: Option<i64>,
    /// Opaque code identifier printed by the kiosk.
    pub code_id: String,
    /// The signed payload as stored.
    pub payload: ClaimPayload,
    /// 64 lowercase hex chars over the canonical payload encoding.
    pub signature: String,
    /// Lifecycle state.
    pub state: ClaimState,
    /// Soft block flag on this claim alone.
    pub blocked: bool,
    /// Reason for the block, when blocked.
    pub blocked_reason: Option<String>,
    /// Issue instant.
    pub issued_at: DateTime<Utc>,
    /// Expiry instant; `now >= expires_at` means expired.
    pub expires_at: DateTime<Utc>,
    /// Set on Pending -> Validated.
    pub validated_at: Option<DateTime<Utc>>,
    /// Set on Validated -> Delivered.
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Claim {
    /// Whether the TTL has elapsed at `now` (half-open upper bound: a scan
    /// at exactly `expires_at` is already too late).
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Tagged union of claim event kinds; serialised into the event log's
/// metadata column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ClaimEventKind {
    /// Claim created in Pending.
    Issued,
    /// Pending -> Validated.
    Validated {
        /// Gatekeeper who scanned.
        gatekeeper_id: String,
    },
    /// Validated -> Delivered.
    Delivered {
        /// Gatekeeper who handed over.
        gatekeeper_id: String,
        /// Label of the consumed box.
        box_label: String,
    },
    /// Admin cancellation.
    Cancelled {
        /// Justification.
        reason: String,
    },
    /// Pending -> Expired.
    Expired {
        /// True when the sweep did it, false for lazy expiry at validate.
        swept: bool,
    },
    /// A validate or deliver hit a claim past that point.
    DuplicateAttempt {
        /// Gatekeeper who scanned.
        gatekeeper_id: String,
        /// State observed at scan time.
        observed_state: ClaimState,
    },
    /// TTL and signature renewed at the kiosk.
    Reprinted {
        /// Justification.
        reason: String,
    },
}

impl ClaimEventKind {
    /// Stable token for the event log's kind column.
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Validated { .. } => "validated",
            Self::Delivered { .. } => "delivered",
            Self::Cancelled { .. } => "cancelled",
            Self::Expired { .. } => "expired",
            Self::DuplicateAttempt { .. } => "duplicate_attempt",
            Self::Reprinted { .. } => "reprinted",
        }
    }
}

/// One row of the append-only claim timeline.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimEvent {
    /// Event id.
    pub id: i64,
    /// Claim the event belongs to.
    pub claim_id: i64,
    /// What happened.
    pub kind: ClaimEventKind,
    /// Who triggered it.
    pub actor_id: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

/// Outcome of a gatekeeper validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The claim was delivered.
    Success,
    /// The attempt was refused; `reason` says why.
    Rejected,
    /// The attempt failed for an unexpected reason.
    Error,
}

impl AttemptOutcome {
    /// Stable storage token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }

    /// Parses a storage token.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on an unrecognised token.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "success" => Ok(Self::Success),
            "rejected" => Ok(Self::Rejected),
            "error" => Ok(Self::Error),
            other => Err(EngineError::Internal(format!(
                "unrecognised attempt outcome: {other}"
            ))),
        }
    }
}

/// Audit row written for every validation attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationAttempt {
    /// Attempt id.
    pub id: i64,
    /// Claim scanned, when one could be resolved.
    pub claim_id: Option<i64>,
    /// Gatekeeper.
    pub gatekeeper_id: String,
    /// Branch the scan happened at.
    pub branch_id: String,
    /// Outcome.
    pub outcome: AttemptOutcome,
    /// Rejection token, e.g. `expired` or `signature_invalid`.
    pub reason: Option<String>,
    /// The raw scanned string.
    pub scanned_code: String,
    /// Physical box code supplied by the gatekeeper, if any.
    pub box_label: Option<String>,
    /// When the attempt happened.
    pub at: DateTime<Utc>,
}

//! Signed-claim lifecycle engine for benefit collection.
//!
//! A kiosk issues an HMAC-signed, short-TTL claim for the one benefit an
//! employee may collect this cycle; a gatekeeper scans the code, and the
//! engine validates the signature, walks the claim through its state
//! machine, and consumes one physical box from branch inventory, all in a
//! single transaction. Every transition and every validation attempt is
//! written to an append-only audit trail.
//!
//! ```text
//!             +-----------+
//!   issue --> |  Pending  | --(ttl)--> Expired --+
//!             +-----------+                      |
//!                   |                            v
//!               validate                     Cancelled
//!                   v                            ^
//!             +-----------+                      |
//!             | Validated | ---------------------+
//!             +-----------+
//!                   |
//!                deliver
//!                   v
//!              Delivered
//! ```
//!
//! [`Engine`] is the single entry point; it owns the SQLite store, the
//! claim signer, and a [`Clock`] so tests can drive time.

pub mod clock;
pub mod code;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod import;
pub mod inventory;
pub mod model;
pub mod national_id;
pub mod roster;
pub mod signer;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, TieBreak};
pub use db::Database;
pub use engine::{
    AdminCapability, ClaimStatus, DeliveredClaim, Engine, IssueRequest, IssuedClaim,
    ValidateRequest,
};
pub use error::EngineError;
pub use model::{
    AttemptOutcome, BenefitType, Claim, ClaimEvent, ClaimEventKind, ClaimPayload, ClaimState,
    ContractCategory, Cycle, Direction, Employee, PhysicalBox, StockLevel, StockMovement,
    ValidationAttempt,
};

//! End-to-end engine tests driving the full issue/validate lifecycle
//! against an in-memory store with a manual clock.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use claimgate_core::{
    AdminCapability, ClaimEventKind, ClaimState, ContractCategory, Database, Direction, Engine,
    EngineConfig, EngineError, IssueRequest, ManualClock, ValidateRequest, import, store,
};

const SECRET_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
const BRANCH: &str = "CENT";

struct Harness {
    engine: Engine,
    clock: Arc<ManualClock>,
    cycle_id: i64,
    benefit_id: i64,
}

fn start_of_cycle() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap()
}

fn config(extra: &str) -> EngineConfig {
    EngineConfig::from_toml(&format!("signing_secret = \"{SECRET_HEX}\"\n{extra}"))
        .unwrap()
}

/// One permanent employee (12345678-5), one active cycle C7, one
/// gatekeeper-validated benefit of box type STD, and `boxes` free boxes
/// at branch CENT.
fn harness_with(extra_config: &str, boxes: usize) -> Harness {
    let db = Database::in_memory().unwrap();
    let (cycle_id, benefit_id) = {
        let conn = db.acquire(None).unwrap();
        import::upsert_employee(&conn, "12345678-5", "Ana Rojas", ContractCategory::Permanent)
            .unwrap();
        let cycle = import::upsert_cycle(
            &conn,
            "C7",
            "2025-06-01".parse().unwrap(),
            "2025-06-30".parse().unwrap(),
            true,
        )
        .unwrap();
        let benefit = import::upsert_benefit_type(
            &conn,
            "Seasonal box",
            true,
            "STD",
            &[ContractCategory::Permanent, ContractCategory::FixedTerm],
        )
        .unwrap();
        import::admit_benefit(&conn, cycle, benefit).unwrap();
        let labels: Vec<String> = (1..=boxes).map(|i| format!("BOX-{i:03}")).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        import::register_boxes(&conn, BRANCH, "STD", &refs, "warehouse").unwrap();
        (cycle, benefit)
    };
    let clock = ManualClock::new(start_of_cycle());
    let engine = Engine::new(db, config(extra_config), clock.clone());
    Harness {
        engine,
        clock,
        cycle_id,
        benefit_id,
    }
}

fn harness() -> Harness {
    harness_with("", 5)
}

fn issue_req(employee_id: &str) -> IssueRequest {
    IssueRequest {
        employee_id: employee_id.to_string(),
        cycle_id: None,
        branch_id: Some(BRANCH.to_string()),
        deadline: None,
    }
}

fn validate_req(code: &str) -> ValidateRequest {
    ValidateRequest {
        scanned_code: code.to_string(),
        gatekeeper_id: "gk-1".to_string(),
        branch_id: BRANCH.to_string(),
        box_code: None,
        deadline: None,
    }
}

#[test]
fn happy_path_issue_validate_deliver() {
    let h = harness();

    let issued = h.engine.issue(&issue_req("12.345.678-5")).unwrap();
    assert_eq!(issued.claim.state, ClaimState::Pending);
    let (code_id, sig) = issued.code.split_once(':').unwrap();
    assert_eq!(code_id, issued.claim.code_id);
    assert_eq!(sig.len(), 64);

    let status = h.engine.get_status(&issued.code).unwrap();
    assert_eq!(status.seconds_to_expiry, 30 * 60);
    assert_eq!(status.events.len(), 1);
    assert_eq!(status.events[0].kind, ClaimEventKind::Issued);

    h.clock.advance(Duration::minutes(5));
    let delivered = h.engine.validate(&validate_req(&issued.code)).unwrap();
    assert_eq!(delivered.claim.state, ClaimState::Delivered);
    assert_eq!(delivered.box_label, "BOX-001");
    assert!(delivered.claim.validated_at.is_some());
    assert!(delivered.claim.delivered_at.is_some());

    let status = h.engine.get_status(&issued.claim.id.to_string()).unwrap();
    let kinds: Vec<&str> = status.events.iter().map(|e| e.kind.token()).collect();
    assert_eq!(kinds, vec!["issued", "validated", "delivered"]);

    let levels = h.engine.stock_summary(Some(BRANCH)).unwrap();
    assert_eq!(levels[0].count, 4);
    assert_eq!(levels[0].free_boxes, 4);
}

#[test]
fn second_issue_returns_the_live_claim() {
    let h = harness();
    let first = h.engine.issue(&issue_req("12345678-5")).unwrap();

    let err = h.engine.issue(&issue_req("12345678-5")).unwrap_err();
    match err {
        EngineError::AlreadyIssued { claim } => assert_eq!(claim.id, first.claim.id),
        other => panic!("expected AlreadyIssued, got {other}"),
    }
}

#[test]
fn issue_rejects_bad_and_unknown_national_ids() {
    let h = harness();
    assert!(matches!(
        h.engine.issue(&issue_req("12345678-4")),
        Err(EngineError::IdMalformed { .. })
    ));
    assert!(matches!(
        h.engine.issue(&issue_req("11111111-1")),
        Err(EngineError::EmployeeNotFound { .. })
    ));
}

#[test]
fn blocked_employee_cannot_issue() {
    let h = harness();
    {
        let conn = h.engine.database().acquire(None).unwrap();
        import::set_employee_blocked(&conn, 1, true).unwrap();
    }
    assert!(matches!(
        h.engine.issue(&issue_req("12345678-5")),
        Err(EngineError::EmployeeBlocked { .. })
    ));
}

#[test]
fn issue_outside_cycle_window_is_rejected() {
    let h = harness();
    h.clock.set(Utc.with_ymd_and_hms(2025, 7, 2, 9, 0, 0).unwrap());
    assert!(matches!(
        h.engine.issue(&issue_req("12345678-5")),
        Err(EngineError::CycleNotCurrent { .. })
    ));
}

#[test]
fn ineligible_category_gets_no_benefit() {
    let h = harness();
    {
        let conn = h.engine.database().acquire(None).unwrap();
        import::upsert_employee(&conn, "20332717-K", "Bruno Silva", ContractCategory::External)
            .unwrap();
    }
    assert!(matches!(
        h.engine.issue(&issue_req("20332717-K")),
        Err(EngineError::NoEligibleBenefit { .. })
    ));
}

#[test]
fn cycle_primary_benefit_wins_the_tie_break() {
    let h = harness();
    let second_benefit = {
        let conn = h.engine.database().acquire(None).unwrap();
        let b = import::upsert_benefit_type(
            &conn,
            "Deluxe box",
            true,
            "XL",
            &[ContractCategory::Permanent],
        )
        .unwrap();
        import::admit_benefit(&conn, h.cycle_id, b).unwrap();
        import::set_primary_benefit(&conn, h.cycle_id, b).unwrap();
        import::register_boxes(&conn, BRANCH, "XL", &["XL-001"], "warehouse").unwrap();
        b
    };
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    assert_eq!(issued.claim.benefit_type_id, second_benefit);
    assert_ne!(issued.claim.benefit_type_id, h.benefit_id);
}

#[test]
fn issue_without_branch_skips_the_stock_precheck() {
    let h = harness_with("", 0);
    assert!(matches!(
        h.engine.issue(&issue_req("12345678-5")),
        Err(EngineError::NoStock { .. })
    ));

    let mut req = issue_req("12345678-5");
    req.branch_id = None;
    h.engine.issue(&req).unwrap();
}

#[test]
fn expired_claim_is_rejected_and_lazily_transitioned() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();

    h.clock.advance(Duration::minutes(30));
    let err = h.engine.validate(&validate_req(&issued.code)).unwrap_err();
    assert!(matches!(err, EngineError::Expired { .. }));

    let status = h.engine.get_status(&issued.code).unwrap();
    assert_eq!(status.claim.state, ClaimState::Expired);
    assert!(status
        .events
        .iter()
        .any(|e| e.kind == ClaimEventKind::Expired { swept: false }));

    let conn = h.engine.database().acquire(None).unwrap();
    let attempts = store::attempts_for(&conn, issued.claim.id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason.as_deref(), Some("expired"));
}

#[test]
fn validation_succeeds_until_the_last_millisecond() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();

    h.clock
        .advance(Duration::minutes(30) - Duration::milliseconds(1));
    let delivered = h.engine.validate(&validate_req(&issued.code)).unwrap();
    assert_eq!(delivered.claim.state, ClaimState::Delivered);
}

#[test]
fn forged_signature_is_rejected_without_consuming_the_claim() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();

    let mut forged = issued.code.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == '0' { '1' } else { '0' });
    let err = h.engine.validate(&validate_req(&forged)).unwrap_err();
    assert!(matches!(err, EngineError::SignatureInvalid { .. }));

    // The genuine code still delivers.
    let delivered = h.engine.validate(&validate_req(&issued.code)).unwrap();
    assert_eq!(delivered.claim.state, ClaimState::Delivered);

    let conn = h.engine.database().acquire(None).unwrap();
    let attempts = store::attempts_for(&conn, issued.claim.id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].reason.as_deref(), Some("signature_invalid"));
    assert!(attempts[1].reason.is_none());
}

#[test]
fn gatekeeper_supplied_box_code_is_honoured() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();

    let mut req = validate_req(&issued.code);
    req.box_code = Some("BOX-003".to_string());
    let delivered = h.engine.validate(&req).unwrap();
    assert_eq!(delivered.box_label, "BOX-003");
    assert_eq!(delivered.claim.box_id, Some(3));
}

#[test]
fn bare_code_id_validates_against_the_stored_signature() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    let delivered = h
        .engine
        .validate(&validate_req(&issued.claim.code_id))
        .unwrap();
    assert_eq!(delivered.claim.state, ClaimState::Delivered);
}

#[test]
fn duplicate_validation_leaves_a_duplicate_attempt_event() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    h.engine.validate(&validate_req(&issued.code)).unwrap();

    let err = h.engine.validate(&validate_req(&issued.code)).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyDelivered { .. }));

    let status = h.engine.get_status(&issued.code).unwrap();
    assert!(status.events.iter().any(|e| matches!(
        &e.kind,
        ClaimEventKind::DuplicateAttempt { observed_state, .. }
            if *observed_state == ClaimState::Delivered
    )));
    // Only one box left the shelf.
    let levels = h.engine.stock_summary(Some(BRANCH)).unwrap();
    assert_eq!(levels[0].count, 4);
}

#[test]
fn concurrent_validation_has_exactly_one_winner() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    let engine = Arc::new(h.engine);

    let mut handles = Vec::new();
    for gatekeeper in ["gk-1", "gk-2"] {
        let engine = engine.clone();
        let code = issued.code.clone();
        let gatekeeper = gatekeeper.to_string();
        handles.push(thread::spawn(move || {
            engine.validate(&ValidateRequest {
                scanned_code: code,
                gatekeeper_id: gatekeeper,
                branch_id: BRANCH.to_string(),
                box_code: None,
                deadline: None,
            })
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|hd| hd.join().unwrap()).collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    EngineError::AlreadyValidated { .. }
                        | EngineError::AlreadyDelivered { .. }
                        | EngineError::Conflict(_)
                ),
                "unexpected loser error: {err}"
            );
        }
    }
    let levels = engine.stock_summary(Some(BRANCH)).unwrap();
    assert_eq!(levels[0].count, 4);
}

#[test]
fn stock_exhaustion_rolls_back_and_keeps_the_claim_pending() {
    let h = harness_with("", 1);
    {
        let conn = h.engine.database().acquire(None).unwrap();
        import::upsert_employee(&conn, "20332717-K", "Bruno Silva", ContractCategory::FixedTerm)
            .unwrap();
    }
    let first = h.engine.issue(&issue_req("12345678-5")).unwrap();
    let second = h.engine.issue(&issue_req("20332717-K")).unwrap();

    h.engine.validate(&validate_req(&first.code)).unwrap();
    let err = h.engine.validate(&validate_req(&second.code)).unwrap_err();
    assert!(matches!(err, EngineError::NoStock { .. }));

    // The failed delivery rolled back wholesale, including its Validated
    // transition; the claim can be collected at a restocked branch later.
    let status = h.engine.get_status(&second.code).unwrap();
    assert_eq!(status.claim.state, ClaimState::Pending);
    assert!(!status
        .events
        .iter()
        .any(|e| matches!(e.kind, ClaimEventKind::Validated { .. })));
}

#[test]
fn sweep_expires_pending_claims_and_is_idempotent() {
    let h = harness();
    {
        let conn = h.engine.database().acquire(None).unwrap();
        import::upsert_employee(&conn, "20332717-K", "Bruno Silva", ContractCategory::FixedTerm)
            .unwrap();
    }
    h.engine.issue(&issue_req("12345678-5")).unwrap();
    let second = h.engine.issue(&issue_req("20332717-K")).unwrap();

    h.clock.advance(Duration::minutes(31));
    assert_eq!(h.engine.sweep_expired().unwrap(), 2);
    assert_eq!(h.engine.sweep_expired().unwrap(), 0);

    let status = h.engine.get_status(&second.code).unwrap();
    assert_eq!(status.claim.state, ClaimState::Expired);
    assert!(status
        .events
        .iter()
        .any(|e| e.kind == ClaimEventKind::Expired { swept: true }));

    // The uniqueness slot is free again within the same cycle.
    h.engine.issue(&issue_req("20332717-K")).unwrap();
}

#[test]
fn reprint_renews_the_ttl_and_invalidates_the_old_print() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();

    h.clock.advance(Duration::minutes(20));
    let reprinted = h
        .engine
        .reprint(issued.claim.id, "printer jam", "kiosk-1")
        .unwrap();
    assert_eq!(reprinted.claim.code_id, issued.claim.code_id);
    assert_ne!(reprinted.code, issued.code);

    let status = h.engine.get_status(&reprinted.code).unwrap();
    assert_eq!(status.seconds_to_expiry, 30 * 60);
    assert!(status
        .events
        .iter()
        .any(|e| matches!(e.kind, ClaimEventKind::Reprinted { .. })));

    // The superseded signature no longer verifies.
    let err = h.engine.validate(&validate_req(&issued.code)).unwrap_err();
    assert!(matches!(err, EngineError::SignatureInvalid { .. }));
    h.engine.validate(&validate_req(&reprinted.code)).unwrap();
}

#[test]
fn reprint_can_rotate_the_code_id() {
    let h = harness_with("reprint_rotates_code = true\n", 5);
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    let reprinted = h
        .engine
        .reprint(issued.claim.id, "lost ticket", "kiosk-1")
        .unwrap();
    assert_ne!(reprinted.claim.code_id, issued.claim.code_id);

    assert!(matches!(
        h.engine.validate(&validate_req(&issued.code)),
        Err(EngineError::ClaimNotFound { .. })
    ));
    h.engine.validate(&validate_req(&reprinted.code)).unwrap();
}

#[test]
fn reprint_is_pending_only() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    h.engine.validate(&validate_req(&issued.code)).unwrap();
    let err = h
        .engine
        .reprint(issued.claim.id, "again", "kiosk-1")
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[test]
fn cancel_requires_the_admin_capability() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();

    assert!(matches!(
        h.engine.cancel(issued.claim.id, "fraud", None),
        Err(EngineError::Forbidden { .. })
    ));

    let admin = AdminCapability::new("admin-1");
    let cancelled = h
        .engine
        .cancel(issued.claim.id, "fraud", Some(&admin))
        .unwrap();
    assert_eq!(cancelled.state, ClaimState::Cancelled);

    let err = h.engine.validate(&validate_req(&issued.code)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[test]
fn delivered_claims_cannot_be_cancelled() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    h.engine.validate(&validate_req(&issued.code)).unwrap();

    let admin = AdminCapability::new("admin-1");
    let err = h
        .engine
        .cancel(issued.claim.id, "oops", Some(&admin))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[test]
fn blocked_claim_is_refused_at_the_gate() {
    let h = harness();
    let issued = h.engine.issue(&issue_req("12345678-5")).unwrap();
    let admin = AdminCapability::new("admin-1");
    h.engine
        .block_claim(issued.claim.id, true, Some("under review"), Some(&admin))
        .unwrap();

    let err = h.engine.validate(&validate_req(&issued.code)).unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    h.engine
        .block_claim(issued.claim.id, false, None, Some(&admin))
        .unwrap();
    h.engine.validate(&validate_req(&issued.code)).unwrap();
}

#[test]
fn manual_stock_movements_are_admin_only_and_guarded() {
    let h = harness();
    let admin = AdminCapability::new("admin-1");

    assert!(matches!(
        h.engine
            .record_stock_movement(BRANCH, "STD", Direction::In, 2, "restock", None),
        Err(EngineError::Forbidden { .. })
    ));

    let count = h
        .engine
        .record_stock_movement(BRANCH, "STD", Direction::In, 2, "restock", Some(&admin))
        .unwrap();
    assert_eq!(count, 7);

    let err = h
        .engine
        .record_stock_movement(BRANCH, "STD", Direction::Out, 10, "typo", Some(&admin))
        .unwrap_err();
    assert!(matches!(err, EngineError::NegativeStock { .. }));
}

#[test]
fn malformed_scan_is_audited_without_a_claim() {
    let h = harness();
    let err = h.engine.validate(&validate_req("not a code!")).unwrap_err();
    assert!(matches!(err, EngineError::CodeMalformed));

    let err = h
        .engine
        .validate(&validate_req("unknown-code-id"))
        .unwrap_err();
    assert!(matches!(err, EngineError::ClaimNotFound { .. }));
}

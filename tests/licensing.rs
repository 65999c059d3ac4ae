//! License subsystem tests: issuance, validation, and the lifecycle sweep,
//! driven directly against the database.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use serde_json::json;

fn validate(
    conn: &rusqlite::Connection,
    key: &str,
    product_id: Option<&str>,
    hardware: Option<&serde_json::Value>,
) -> ValidationOutcome {
    licensing::validate_license(conn, key, product_id, hardware, ValidationPolicy::default(), now())
        .expect("validation should not error")
}

// ============ Issuance ============

#[test]
fn test_issue_one_license_per_unit_across_items() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let monthly = create_test_product(&conn, "aim-trainer", Some(30), false);
    let perpetual = create_test_product(&conn, "macro-kit", None, false);
    let order = create_test_order(&mut conn, &user.id, &[(&monthly, 2), (&perpetual, 3)]);

    let issuance = pay_and_issue(&mut conn, &order.order.id);

    assert_eq!(issuance.licenses.len(), 5);
    let rows = queries::list_licenses_for_order(&conn, &order.order.id).unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows.iter().filter(|l| l.product_id == monthly.id).count(), 2);
    assert_eq!(rows.iter().filter(|l| l.product_id == perpetual.id).count(), 3);

    let keys: HashSet<_> = rows.iter().map(|l| l.license_key.clone()).collect();
    assert_eq!(keys.len(), 5, "every unit gets its own key");

    for license in &rows {
        assert_eq!(license.status, LicenseStatus::Active);
        assert!(validate(&conn, &license.license_key, Some(&license.product_id), None).is_valid());
    }
}

#[test]
fn test_issue_sets_expiry_from_product_duration() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let monthly = create_test_product(&conn, "aim-trainer", Some(30), true);
    let perpetual = create_test_product(&conn, "macro-kit", None, false);
    let order = create_test_order(&mut conn, &user.id, &[(&monthly, 1), (&perpetual, 1)]);

    let issuance = pay_and_issue(&mut conn, &order.order.id);

    let timed = issuance.licenses.iter().find(|l| l.product_id == monthly.id).unwrap();
    assert_eq!(timed.expires_at, Some(timed.created_at + 30 * ONE_DAY));
    assert!(timed.requires_hardware_binding);

    let forever = issuance.licenses.iter().find(|l| l.product_id == perpetual.id).unwrap();
    assert_eq!(forever.expires_at, None);
    assert!(!forever.requires_hardware_binding);
}

#[test]
fn test_issue_refuses_second_run_for_same_order() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    let order = create_test_order(&mut conn, &user.id, &[(&product, 2)]);
    pay_and_issue(&mut conn, &order.order.id);

    let result = licensing::issue_licenses_for_order(
        &conn,
        &order.order.id,
        &mut RandomKeySource::new("GT"),
        now(),
    );

    assert!(matches!(result, Err(toolvault::error::AppError::Conflict(_))));
    assert_eq!(queries::count_licenses_for_order(&conn, &order.order.id).unwrap(), 2);
}

#[test]
fn test_issue_records_license_issued_notice() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    let order = create_test_order(&mut conn, &user.id, &[(&product, 3)]);

    let issuance = pay_and_issue(&mut conn, &order.order.id);

    assert_eq!(issuance.notices.len(), 1, "one notice per order line");
    let (notices, total) = queries::list_notifications_for_user(&conn, &user.id, 50, 0).unwrap();
    assert_eq!(total, 1);
    assert_eq!(notices[0].kind, NotificationKind::LicenseIssued);
    assert!(notices[0].message.contains("3 licenses"));
}

#[test]
fn test_key_collision_retries_with_fresh_draw() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, false);
    let existing = create_test_license(&conn, &user, &product, None);
    let order = create_test_order(&mut conn, &user.id, &[(&product, 2)]);

    // First unit collides twice before a fresh key lands
    let mut keys = FixedKeySource::new(&[
        &existing.license_key,
        &existing.license_key,
        "GT-AAAAA-AAAAA-AAAAA-AAAA1",
        "GT-AAAAA-AAAAA-AAAAA-AAAA2",
    ]);
    let tx = conn.transaction().unwrap();
    assert!(queries::try_mark_order_paid(&tx, &order.order.id, "txn", now()).unwrap());
    let issuance =
        licensing::issue_licenses_for_order(&tx, &order.order.id, &mut keys, now()).unwrap();
    tx.commit().unwrap();

    let issued: Vec<_> = issuance.licenses.iter().map(|l| l.license_key.as_str()).collect();
    assert_eq!(issued, ["GT-AAAAA-AAAAA-AAAAA-AAAA1", "GT-AAAAA-AAAAA-AAAAA-AAAA2"]);
}

#[test]
fn test_key_collision_exhaustion_rolls_back_order() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, false);
    let existing = create_test_license(&conn, &user, &product, None);
    let order = create_test_order(&mut conn, &user.id, &[(&product, 3)]);

    // Unit 1 succeeds, unit 2 collides on every attempt
    let mut sequence = vec!["GT-BBBBB-BBBBB-BBBBB-BBBB1"];
    sequence.extend(std::iter::repeat_n(existing.license_key.as_str(), licensing::MAX_KEY_ATTEMPTS));
    let mut keys = FixedKeySource::new(&sequence);

    {
        let tx = conn.transaction().unwrap();
        assert!(queries::try_mark_order_paid(&tx, &order.order.id, "txn", now()).unwrap());
        let result = licensing::issue_licenses_for_order(&tx, &order.order.id, &mut keys, now());
        assert!(matches!(result, Err(toolvault::error::AppError::KeyGeneration(_))));
        // tx dropped here without commit
    }

    let order = queries::get_order_by_id(&conn, &order.order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending, "paid transition rolled back");
    assert_eq!(queries::count_licenses_for_order(&conn, &order.id).unwrap(), 0);
    assert!(queries::get_license_by_key(&conn, "GT-BBBBB-BBBBB-BBBBB-BBBB1").unwrap().is_none());
}

#[test]
fn test_paid_transition_is_compare_and_set() {
    let test = create_test_app_state();
    let mut conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, false);
    let order = create_test_order(&mut conn, &user.id, &[(&product, 1)]);

    assert!(queries::try_mark_order_paid(&conn, &order.order.id, "txn-1", now()).unwrap());
    assert!(!queries::try_mark_order_paid(&conn, &order.order.id, "txn-2", now()).unwrap());
    assert!(!queries::try_mark_order_failed(&conn, &order.order.id, "txn-3").unwrap());

    let order = queries::get_order_by_id(&conn, &order.order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some("txn-1"));
}

// ============ Validation ============

#[test]
fn test_validate_unknown_key_is_not_found() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let outcome = validate(&conn, "GT-NOPE0-NOPE0-NOPE0-NOPE0", None, None);
    assert_eq!(outcome.reason(), Some(licensing::InvalidReason::NotFound));
}

#[test]
fn test_validate_key_lookup_is_case_sensitive() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, false);
    let license = create_test_license(&conn, &user, &product, None);

    let lowered = license.license_key.to_lowercase();
    assert_eq!(
        validate(&conn, &lowered, None, None).reason(),
        Some(licensing::InvalidReason::NotFound)
    );
    assert!(validate(&conn, &license.license_key, None, None).is_valid());
}

#[test]
fn test_validate_past_expiry_marks_row_expired() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    let license = create_test_license(&conn, &user, &product, Some(past_timestamp(1)));
    assert_eq!(license_status(&conn, &license.id), LicenseStatus::Active);

    let outcome = validate(&conn, &license.license_key, None, None);

    assert_eq!(outcome.reason(), Some(licensing::InvalidReason::Expired));
    assert_eq!(license_status(&conn, &license.id), LicenseStatus::Expired);

    // Second call sees the persisted state
    let again = validate(&conn, &license.license_key, None, None);
    assert_eq!(again.reason(), Some(licensing::InvalidReason::Expired));
}

#[test]
fn test_validate_revoked_wins_over_expiry() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    let license = create_test_license(&conn, &user, &product, Some(past_timestamp(1)));
    assert!(queries::revoke_license(&conn, &license.id, now()).unwrap());

    let outcome = validate(&conn, &license.license_key, None, None);

    assert_eq!(outcome.reason(), Some(licensing::InvalidReason::Revoked));
    assert_eq!(license_status(&conn, &license.id), LicenseStatus::Revoked);
}

#[test]
fn test_validate_expiry_checked_before_product() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    let license = create_test_license(&conn, &user, &product, Some(past_timestamp(2)));

    let outcome = validate(&conn, &license.license_key, Some("some-other-product"), None);
    assert_eq!(outcome.reason(), Some(licensing::InvalidReason::Expired));
}

#[test]
fn test_validate_wrong_product() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, false);
    let other = create_test_product(&conn, "macro-kit", None, false);
    let license = create_test_license(&conn, &user, &product, None);

    let outcome = validate(&conn, &license.license_key, Some(&other.id), None);
    assert_eq!(outcome.reason(), Some(licensing::InvalidReason::ProductMismatch));
    assert!(validate(&conn, &license.license_key, Some(&product.id), None).is_valid());
}

#[test]
fn test_validate_returns_license_product_and_user() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, false);
    let license = create_test_license(&conn, &user, &product, None);

    match validate(&conn, &license.license_key, None, None) {
        ValidationOutcome::Valid(valid) => {
            assert_eq!(valid.license.id, license.id);
            assert_eq!(valid.product.id, product.id);
            assert_eq!(valid.user.email, "player@example.com");
            assert!(!valid.newly_bound);
        }
        ValidationOutcome::Invalid(reason) => panic!("expected valid, got {:?}", reason),
    }
}

#[test]
fn test_hardware_first_validation_binds() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, true);
    let license = create_test_license(&conn, &user, &product, None);
    let machine_a = json!({"cpu": "ryzen-7", "disk": "S3Z9NB0K"});
    let machine_b = json!({"cpu": "i9-13900k", "disk": "WD-XYZ"});

    match validate(&conn, &license.license_key, None, Some(&machine_a)) {
        ValidationOutcome::Valid(valid) => assert!(valid.newly_bound),
        other => panic!("expected bind, got {:?}", other),
    }
    let stored = queries::get_license_by_id(&conn, &license.id).unwrap().unwrap();
    assert_eq!(stored.hardware_fingerprint, crypto::hardware_fingerprint(&machine_a));
    assert!(stored.hardware_bound_at.is_some());

    // Same machine, keys in a different order
    let machine_a_reordered = json!({"disk": "S3Z9NB0K", "cpu": "ryzen-7"});
    match validate(&conn, &license.license_key, None, Some(&machine_a_reordered)) {
        ValidationOutcome::Valid(valid) => assert!(!valid.newly_bound),
        other => panic!("expected valid, got {:?}", other),
    }

    assert_eq!(
        validate(&conn, &license.license_key, None, Some(&machine_b)).reason(),
        Some(licensing::InvalidReason::HardwareMismatch)
    );
    // Mismatch does not move the binding
    let stored = queries::get_license_by_id(&conn, &license.id).unwrap().unwrap();
    assert_eq!(stored.hardware_fingerprint, crypto::hardware_fingerprint(&machine_a));
}

#[test]
fn test_hardware_binding_ignored_for_unbound_products() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "macro-kit", None, false);
    let license = create_test_license(&conn, &user, &product, None);

    assert!(validate(&conn, &license.license_key, None, Some(&json!("machine-1"))).is_valid());
    assert!(validate(&conn, &license.license_key, None, Some(&json!("machine-2"))).is_valid());
    let stored = queries::get_license_by_id(&conn, &license.id).unwrap().unwrap();
    assert!(stored.hardware_fingerprint.is_none());
}

#[test]
fn test_hardware_missing_fingerprint_follows_policy() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, true);
    let license = create_test_license(&conn, &user, &product, None);

    let permissive = licensing::validate_license(
        &conn,
        &license.license_key,
        None,
        None,
        ValidationPolicy::default(),
        now(),
    )
    .unwrap();
    assert!(permissive.is_valid());

    let strict = licensing::validate_license(
        &conn,
        &license.license_key,
        None,
        Some(&json!({})),
        ValidationPolicy {
            require_fingerprint: true,
        },
        now(),
    )
    .unwrap();
    assert_eq!(strict.reason(), Some(licensing::InvalidReason::HardwareRequired));

    // Neither call pinned anything
    let stored = queries::get_license_by_id(&conn, &license.id).unwrap().unwrap();
    assert!(stored.hardware_fingerprint.is_none());
}

#[test]
fn test_revoked_or_expired_license_cannot_be_bound() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), true);
    let revoked = create_test_license(&conn, &user, &product, Some(future_timestamp(10)));
    let lapsed = create_test_license(&conn, &user, &product, Some(past_timestamp(1)));
    let machine = json!({"cpu": "ryzen-7", "disk": "S3Z9NB0K"});
    let fingerprint = crypto::hardware_fingerprint(&machine).unwrap();

    assert!(queries::revoke_license(&conn, &revoked.id, now()).unwrap());
    assert!(queries::expire_license_if_due(&conn, &lapsed.id, now()).unwrap());

    assert!(!queries::try_bind_hardware(&conn, &revoked.id, &fingerprint, now()).unwrap());
    assert!(!queries::try_bind_hardware(&conn, &lapsed.id, &fingerprint, now()).unwrap());

    assert_eq!(
        validate(&conn, &revoked.license_key, None, Some(&machine)).reason(),
        Some(licensing::InvalidReason::Revoked)
    );
    assert_eq!(
        validate(&conn, &lapsed.license_key, None, Some(&machine)).reason(),
        Some(licensing::InvalidReason::Expired)
    );
    for id in [&revoked.id, &lapsed.id] {
        let stored = queries::get_license_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(stored.hardware_fingerprint, None);
        assert_eq!(stored.hardware_bound_at, None);
    }
}

#[test]
fn test_release_hardware_allows_rebinding() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", None, true);
    let license = create_test_license(&conn, &user, &product, None);

    assert!(validate(&conn, &license.license_key, None, Some(&json!("old-pc"))).is_valid());
    assert!(queries::release_hardware(&conn, &license.id).unwrap());
    assert!(validate(&conn, &license.license_key, None, Some(&json!("new-pc"))).is_valid());
    assert_eq!(
        validate(&conn, &license.license_key, None, Some(&json!("old-pc"))).reason(),
        Some(licensing::InvalidReason::HardwareMismatch)
    );
}

#[test]
fn test_concurrent_binding_has_exactly_one_winner() {
    let test = create_test_app_state();
    let license = {
        let conn = test.db.get().unwrap();
        let user = create_test_user(&conn, "player@example.com");
        let product = create_test_product(&conn, "aim-trainer", None, true);
        create_test_license(&conn, &user, &product, None)
    };

    for round in 0..10 {
        if round > 0 {
            let conn = test.db.get().unwrap();
            queries::release_hardware(&conn, &license.id).unwrap();
        }

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["machine-a", "machine-b"]
            .into_iter()
            .map(|machine| {
                let pool = test.db.clone();
                let barrier = barrier.clone();
                let key = license.license_key.clone();
                thread::spawn(move || {
                    let conn = pool.get().unwrap();
                    barrier.wait();
                    let outcome = licensing::validate_license(
                        &conn,
                        &key,
                        None,
                        Some(&json!(machine)),
                        ValidationPolicy::default(),
                        now(),
                    )
                    .unwrap();
                    (machine, outcome)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter(|(_, o)| o.is_valid()).collect();
        let losers: Vec<_> = results
            .iter()
            .filter(|(_, o)| o.reason() == Some(licensing::InvalidReason::HardwareMismatch))
            .collect();
        assert_eq!(winners.len(), 1, "round {}: exactly one machine binds", round);
        assert_eq!(losers.len(), 1, "round {}: the other sees a mismatch", round);

        let conn = test.db.get().unwrap();
        let stored = queries::get_license_by_id(&conn, &license.id).unwrap().unwrap();
        assert_eq!(
            stored.hardware_fingerprint,
            crypto::hardware_fingerprint(&json!(winners[0].0)),
            "stored fingerprint belongs to the winner"
        );
    }
}

#[test]
fn test_lazy_and_sweep_expiry_do_not_conflict() {
    let test = create_test_app_state();
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    let license = create_test_license(&conn, &user, &product, Some(past_timestamp(1)));

    assert!(queries::expire_license_if_due(&conn, &license.id, now()).unwrap());
    // Whoever comes second is a no-op, not an error
    assert!(!queries::expire_license_if_due(&conn, &license.id, now()).unwrap());
    assert_eq!(queries::expire_due_licenses(&conn, now()).unwrap(), 0);
    assert_eq!(
        validate(&conn, &license.license_key, None, None).reason(),
        Some(licensing::InvalidReason::Expired)
    );
}

// ============ Sweep ============

#[tokio::test]
async fn test_sweep_expiry_phase_is_idempotent() {
    let test = create_test_app_state();
    let (expired_id, active_id) = {
        let conn = test.db.get().unwrap();
        let user = create_test_user(&conn, "player@example.com");
        let product = create_test_product(&conn, "aim-trainer", Some(30), false);
        let expired = create_test_license(&conn, &user, &product, Some(past_timestamp(3)));
        create_test_license(&conn, &user, &product, Some(past_timestamp(1)));
        let active = create_test_license(&conn, &user, &product, Some(future_timestamp(60)));
        create_test_license(&conn, &user, &product, None);
        (expired.id, active.id)
    };

    let first = licensing::run_sweep(&test, now()).unwrap();
    assert_eq!(first.expired_licenses_marked, 2);

    let second = licensing::run_sweep(&test, now()).unwrap();
    assert_eq!(second.expired_licenses_marked, 0);

    let conn = test.db.get().unwrap();
    assert_eq!(license_status(&conn, &expired_id), LicenseStatus::Expired);
    assert_eq!(license_status(&conn, &active_id), LicenseStatus::Active);
}

#[tokio::test]
async fn test_sweep_skips_revoked_licenses() {
    let test = create_test_app_state();
    let license_id = {
        let conn = test.db.get().unwrap();
        let user = create_test_user(&conn, "player@example.com");
        let product = create_test_product(&conn, "aim-trainer", Some(30), false);
        let license = create_test_license(&conn, &user, &product, Some(past_timestamp(1)));
        queries::revoke_license(&conn, &license.id, now()).unwrap();
        license.id
    };

    let report = licensing::run_sweep(&test, now()).unwrap();

    assert_eq!(report.expired_licenses_marked, 0);
    let conn = test.db.get().unwrap();
    assert_eq!(license_status(&conn, &license_id), LicenseStatus::Revoked);
}

#[tokio::test]
async fn test_sweep_warning_windows() {
    let test = create_test_app_state();
    let user_id = {
        let conn = test.db.get().unwrap();
        let user = create_test_user(&conn, "player@example.com");
        let product = create_test_product(&conn, "aim-trainer", Some(30), false);
        // Inside 1 day (also inside 7 days)
        create_test_license(&conn, &user, &product, Some(now() + 6 * 3600));
        // Inside 7 days only
        create_test_license(&conn, &user, &product, Some(future_timestamp(3)));
        // Outside both windows
        create_test_license(&conn, &user, &product, Some(future_timestamp(20)));
        create_test_license(&conn, &user, &product, None);
        user.id
    };

    let report = licensing::run_sweep(&test, now()).unwrap();

    assert_eq!(report.expiring_in_7_days, 2);
    assert_eq!(report.expiring_in_1_day, 1);
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(report.urgent_notifications_sent, 1);

    let conn = test.db.get().unwrap();
    let (notices, total) = queries::list_notifications_for_user(&conn, &user_id, 50, 0).unwrap();
    assert_eq!(total, 3);
    assert_eq!(
        notices
            .iter()
            .filter(|n| n.kind == NotificationKind::LicenseExpiringUrgent)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_sweep_rerun_does_not_duplicate_warnings() {
    let test = create_test_app_state();
    let user_id = {
        let conn = test.db.get().unwrap();
        let user = create_test_user(&conn, "player@example.com");
        let product = create_test_product(&conn, "aim-trainer", Some(30), false);
        create_test_license(&conn, &user, &product, Some(now() + 12 * 3600));
        create_test_license(&conn, &user, &product, Some(future_timestamp(5)));
        user.id
    };

    let first = licensing::run_sweep(&test, now()).unwrap();
    assert_eq!(first.notifications_sent, 2);
    assert_eq!(first.urgent_notifications_sent, 1);

    let second = licensing::run_sweep(&test, now()).unwrap();
    assert_eq!(second.expiring_in_7_days, 2, "candidates are still reported");
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(second.urgent_notifications_sent, 0);

    let conn = test.db.get().unwrap();
    let (_, total) = queries::list_notifications_for_user(&conn, &user_id, 50, 0).unwrap();
    assert_eq!(total, 3);
}

fn seed_expiring_soon(test: &TestApp) -> User {
    let conn = test.db.get().unwrap();
    let user = create_test_user(&conn, "player@example.com");
    let product = create_test_product(&conn, "aim-trainer", Some(30), false);
    create_test_license(&conn, &user, &product, Some(now() + 12 * 3600));
    create_test_license(&conn, &user, &product, Some(future_timestamp(5)));
    user
}

#[tokio::test]
async fn test_sweep_delivers_warnings_through_webhook() {
    let mut test = create_test_app_state();
    let (hook_url, received) = spawn_webhook_sink().await;
    use_webhook_notifier(&mut test, &hook_url);
    let user = seed_expiring_soon(&test);

    let report = licensing::run_sweep_and_deliver(&test, now()).await.unwrap();
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(report.urgent_notifications_sent, 1);

    let payloads = received.lock().unwrap().clone();
    assert_eq!(payloads.len(), 3);
    let events: Vec<_> = payloads.iter().map(|p| p["event"].as_str().unwrap()).collect();
    assert_eq!(events.iter().filter(|e| **e == "license_expiring").count(), 2);
    assert_eq!(events.iter().filter(|e| **e == "license_expiring_urgent").count(), 1);
    for payload in &payloads {
        assert_eq!(payload["to_email"], user.email);
        assert_eq!(payload["kind"], payload["event"]);
        assert!(payload["license_id"].is_string());
        assert!(payload["sent_at"].is_i64());
    }

    // Nothing new to warn about, nothing sent
    licensing::run_sweep_and_deliver(&test, now()).await.unwrap();
    assert_eq!(received.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_sweep_returns_before_outbound_delivery_finishes() {
    let mut test = create_test_app_state();
    // Nothing listens on the discard port, so every send fails and backs off
    use_webhook_notifier(&mut test, "http://127.0.0.1:9/hook");
    let user = seed_expiring_soon(&test);

    let started = std::time::Instant::now();
    let report = licensing::run_sweep(&test, now()).unwrap();

    assert!(
        started.elapsed() < std::time::Duration::from_secs(1),
        "sweep waited on delivery: {:?}",
        started.elapsed()
    );
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(report.urgent_notifications_sent, 1);
    let conn = test.db.get().unwrap();
    let (_, total) = queries::list_notifications_for_user(&conn, &user.id, 50, 0).unwrap();
    assert_eq!(total, 3, "in-app notices are recorded up front");
}

#[test]
fn test_sweep_report_serializes_camel_case() {
    let report = licensing::SweepReport {
        expired_licenses_marked: 1,
        expiring_in_7_days: 2,
        expiring_in_1_day: 3,
        notifications_sent: 4,
        urgent_notifications_sent: 5,
    };
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(
        value,
        json!({
            "expiredLicensesMarked": 1,
            "expiringIn7Days": 2,
            "expiringIn1Day": 3,
            "notificationsSent": 4,
            "urgentNotificationsSent": 5
        })
    );
}

mod common;

use clinic_billing_service::billing::DiscountType;
use clinic_billing_service::error::BillingError;
use clinic_billing_service::models::{AuditAction, PaymentMethod, PaymentStatus};
use common::{dec, TestApp};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_create_bill_prices_services_and_consultation_fee() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let input = app.create_input(doc, &[(app.catalog.cbc, "2"), (app.catalog.xray, "1")]);
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.breakdown.services_subtotal, dec("1100"));
    assert_eq!(details.breakdown.discount_type, DiscountType::None);
    assert_eq!(details.bill.consultation_fee, dec("250"));
    assert_eq!(details.bill.total_amount, dec("1350"));
    assert_eq!(details.bill.amount_paid, Decimal::ZERO);
    assert_eq!(details.bill.balance, dec("1350"));
    assert_eq!(details.bill.status(), PaymentStatus::Unpaid);
    assert_eq!(details.services.len(), 2);
    assert!(details.payments.is_empty());
}

#[tokio::test]
async fn test_line_items_snapshot_catalog_values() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let input = app.create_input(doc, &[(app.catalog.urinalysis, "3")]);
    let details = app.engine.create_bill(input).await.unwrap();

    let line = &details.services[0];
    assert_eq!(line.service_name, "Urinalysis");
    assert_eq!(line.service_category, "laboratory");
    assert_eq!(line.service_price_at_time, dec("333.333"));
    assert_eq!(line.subtotal, dec("1000.00"));
    assert_eq!(details.bill.total_amount, dec("1250.00"));
}

#[tokio::test]
async fn test_initial_payment_is_written_to_the_ledger() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.cbc, "2"), (app.catalog.xray, "1")]);
    input.initial_payment_amount = Some(dec("500"));
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.bill.amount_paid, dec("500"));
    assert_eq!(details.bill.balance, dec("850"));
    assert_eq!(details.bill.status(), PaymentStatus::PartiallyPaid);
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.payments[0].amount, dec("500"));
    assert_eq!(details.payments[0].payment_method, PaymentMethod::Cash.as_str());
    assert_eq!(details.payments[0].notes.as_deref(), Some("Initial payment"));
}

#[tokio::test]
async fn test_full_initial_payment_marks_bill_paid() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.xray, "1")]);
    input.initial_payment_amount = Some(dec("750"));
    input.payment_method = Some(PaymentMethod::Gcash);
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.bill.status(), PaymentStatus::Paid);
    assert_eq!(details.bill.balance, Decimal::ZERO);
    assert_eq!(details.display_balance, Decimal::ZERO);
    assert_eq!(details.payments[0].payment_method, "gcash");
}

#[tokio::test]
async fn test_initial_payment_above_total_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.cbc, "1")]);
    input.initial_payment_amount = Some(dec("550.01"));
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
    let state = app.store.snapshot().await;
    assert!(state.bills.is_empty());
    assert!(state.billed_services.is_empty());
    assert!(state.payments.is_empty());
    assert!(state.bill_audit_logs.is_empty());
    assert!(state.daily_analytics.is_empty());
}

#[tokio::test]
async fn test_negative_initial_payment_is_rejected() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.cbc, "1")]);
    input.initial_payment_amount = Some(dec("-1"));
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
}

#[tokio::test]
async fn test_senior_discount_takes_precedence_over_custom_rate() {
    let app = TestApp::new().await;
    let doc = app.senior_documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.cbc, "2"), (app.catalog.xray, "1")]);
    input.is_senior_pwd_discount_applied = Some(true);
    input.discount_rate = Some(dec("10"));
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.breakdown.discount_type, DiscountType::SeniorPwd);
    assert_eq!(details.breakdown.discount_amount, dec("220"));
    assert_eq!(details.breakdown.services_total, dec("880"));
    assert_eq!(details.bill.total_amount, dec("1130"));
    assert!(details.bill.is_senior_pwd_discount_applied);
    assert_eq!(details.bill.discount_rate, Decimal::ZERO);
}

#[tokio::test]
async fn test_custom_discount_never_touches_consultation_fee() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.cbc, "2"), (app.catalog.xray, "1")]);
    input.discount_rate = Some(dec("10"));
    input.consultation_fee = Some(dec("350"));
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.breakdown.discount_type, DiscountType::Custom);
    assert_eq!(details.breakdown.discount_amount, dec("110"));
    assert_eq!(details.bill.consultation_fee, dec("350"));
    assert_eq!(details.bill.total_amount, dec("1340"));
    assert_eq!(details.bill.discount_rate, dec("10"));
    assert!(!details.bill.is_senior_pwd_discount_applied);
}

#[tokio::test]
async fn test_consultation_only_bill_ignores_discount() {
    let app = TestApp::new().await;
    let doc = app.senior_documentation().await;

    let mut input = app.create_input(doc, &[]);
    input.is_senior_pwd_discount_applied = Some(true);
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.breakdown.discount_type, DiscountType::None);
    assert_eq!(details.breakdown.discount_amount, Decimal::ZERO);
    assert_eq!(details.bill.total_amount, dec("250"));
    // The policy is kept for services added later.
    assert!(details.bill.is_senior_pwd_discount_applied);
    assert!(details.services.is_empty());
}

#[tokio::test]
async fn test_senior_discount_without_patient_id_is_rejected() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.xray, "1")]);
    input.is_senior_pwd_discount_applied = Some(true);
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidState(_)));
    assert!(app.store.snapshot().await.bills.is_empty());
}

#[tokio::test]
async fn test_senior_bill_accepts_later_updates() {
    let app = TestApp::new().await;
    let doc = app.senior_documentation().await;
    let mut input = app.create_input(doc, &[(app.catalog.xray, "1")]);
    input.is_senior_pwd_discount_applied = Some(true);
    let created = app.engine.create_bill(input).await.unwrap();
    assert_eq!(created.bill.total_amount, dec("650"));

    let mut update = app.update_input(created.bill.bill_id);
    update.notes = Some("Receipt reprinted".to_string());
    update.amount_paid = Some(dec("100"));
    let updated = app.engine.update_bill(update).await.unwrap();

    assert!(updated.details.bill.is_senior_pwd_discount_applied);
    assert_eq!(updated.details.bill.amount_paid, dec("100"));
    assert_eq!(updated.details.bill.balance, dec("550"));
}

#[tokio::test]
async fn test_oversized_quantity_is_rejected() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let input = app.create_input(doc, &[(app.catalog.cbc, "79228162514264337593543950335")]);
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
    assert!(app.store.snapshot().await.bills.is_empty());
}

#[tokio::test]
async fn test_bill_total_beyond_storable_range_is_rejected() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    // 9,000,000,000 units at 500.00 stays a valid quantity but not a valid total.
    let input = app.create_input(doc, &[(app.catalog.xray, "9000000000")]);
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
}

#[tokio::test]
async fn test_sub_cent_quantity_and_payment_are_rejected() {
    let app = TestApp::new().await;

    let doc = app.documentation().await;
    let input = app.create_input(doc, &[(app.catalog.cbc, "0.125")]);
    let err = app.engine.create_bill(input).await.unwrap_err();
    assert!(matches!(err, BillingError::InvalidInput(_)));

    let doc = app.documentation().await;
    let mut input = app.create_input(doc, &[(app.catalog.cbc, "1")]);
    input.initial_payment_amount = Some(dec("0.001"));
    let err = app.engine.create_bill(input).await.unwrap_err();
    assert!(matches!(err, BillingError::InvalidInput(_)));

    assert!(app.store.snapshot().await.bills.is_empty());
}

#[tokio::test]
async fn test_unknown_consultation_fee_falls_back_to_default() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[]);
    input.consultation_fee = Some(dec("999"));
    let details = app.engine.create_bill(input).await.unwrap();

    assert_eq!(details.bill.consultation_fee, dec("250"));
}

#[tokio::test]
async fn test_discount_rate_out_of_range_is_rejected() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.cbc, "1")]);
    input.discount_rate = Some(dec("101"));
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
}

#[tokio::test]
async fn test_second_bill_for_documentation_conflicts() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    app.engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "1")]))
        .await
        .unwrap();
    let err = app
        .engine
        .create_bill(app.create_input(doc, &[(app.catalog.xray, "1")]))
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Conflict(_)));
    assert_eq!(app.store.snapshot().await.bills.len(), 1);
}

#[tokio::test]
async fn test_draft_documentation_cannot_be_billed() {
    let app = TestApp::new().await;
    let doc = app.draft_documentation().await;

    let err = app
        .engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "1")]))
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::InvalidState(_)));
}

#[tokio::test]
async fn test_missing_documentation_is_not_found() {
    let app = TestApp::new().await;

    let mut input = app.create_input(uuid::Uuid::new_v4(), &[(app.catalog.cbc, "1")]);
    input.cleanup_documentation_on_failure = true;
    let err = app.engine.create_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn test_unbillable_services_are_unavailable() {
    let app = TestApp::new().await;

    for service_id in [app.catalog.deactivated, app.catalog.out_of_stock] {
        let doc = app.documentation().await;
        let input = app.create_input(doc, &[(app.catalog.cbc, "1"), (service_id, "1")]);
        let err = app.engine.create_bill(input).await.unwrap_err();
        assert!(matches!(err, BillingError::Unavailable(_)));
    }

    let state = app.store.snapshot().await;
    assert!(state.bills.is_empty());
    assert!(state.billed_services.is_empty());
}

#[tokio::test]
async fn test_non_positive_quantity_is_rejected() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let err = app
        .engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "0")]))
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
}

#[tokio::test]
async fn test_failed_creation_removes_documentation_when_requested() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let mut input = app.create_input(doc, &[(app.catalog.deactivated, "1")]);
    input.cleanup_documentation_on_failure = true;
    app.engine.create_bill(input).await.unwrap_err();

    assert!(!app.store.snapshot().await.documentations.contains_key(&doc));
}

#[tokio::test]
async fn test_failed_creation_keeps_documentation_by_default() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let input = app.create_input(doc, &[(app.catalog.deactivated, "1")]);
    app.engine.create_bill(input).await.unwrap_err();

    assert!(app.store.snapshot().await.documentations.contains_key(&doc));
}

#[tokio::test]
async fn test_conflict_does_not_remove_billed_documentation() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    app.engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "1")]))
        .await
        .unwrap();
    let mut input = app.create_input(doc, &[(app.catalog.cbc, "1")]);
    input.cleanup_documentation_on_failure = true;
    app.engine.create_bill(input).await.unwrap_err();

    // Still referenced by the first bill.
    assert!(app.store.snapshot().await.documentations.contains_key(&doc));
}

#[tokio::test]
async fn test_creation_is_audited() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;

    let details = app
        .engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "1"), (app.catalog.xray, "2")]))
        .await
        .unwrap();
    let trail = app.engine.audit_trail(details.bill.bill_id).await.unwrap();

    assert_eq!(trail.bill_entries.len(), 1);
    let created = &trail.bill_entries[0];
    assert_eq!(created.action(), AuditAction::Created);
    assert_eq!(created.actor_name, "Maria Santos");
    assert_eq!(created.actor_role, "cashier");
    assert!(created.previous_data.is_none());
    assert!(created.new_data.is_some());

    assert_eq!(trail.service_entries.len(), 2);
    assert!(trail
        .service_entries
        .iter()
        .all(|e| e.action() == AuditAction::Added));
}

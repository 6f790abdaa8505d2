mod common;

use clinic_billing_service::billing::{ArchiveBill, RecordPayment};
use clinic_billing_service::error::BillingError;
use clinic_billing_service::models::{AuditAction, PaymentMethod};
use common::{actor, dec, TestApp};
use rust_decimal::Decimal;
use uuid::Uuid;

fn archive(bill_id: Uuid) -> ArchiveBill {
    ArchiveBill {
        bill_id,
        export_path: "s3://clinic-archive/2026/bills.parquet".to_string(),
        actor: actor(),
    }
}

#[tokio::test]
async fn test_archive_removes_bill_lines_and_payments() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;
    let mut input = app.create_input(doc, &[(app.catalog.cbc, "1"), (app.catalog.xray, "1")]);
    input.initial_payment_amount = Some(dec("300"));
    let bill_id = app.engine.create_bill(input).await.unwrap().bill.bill_id;
    app.engine
        .record_payment(RecordPayment {
            bill_id,
            amount: dec("200"),
            payment_method: PaymentMethod::Cash,
            notes: None,
            actor: actor(),
        })
        .await
        .unwrap();

    let archived = app.engine.archive_bill(archive(bill_id)).await.unwrap();

    assert_eq!(archived.bill_id, bill_id);
    assert_eq!(archived.services_removed, 2);
    assert_eq!(archived.payments_removed, 2);

    let state = app.store.snapshot().await;
    assert!(state.bills.is_empty());
    assert!(state.billed_services.is_empty());
    assert!(state.payments.is_empty());
    // The documentation belongs to the clinical record and stays.
    assert!(state.documentations.contains_key(&doc));

    let err = app.engine.get_bill(bill_id).await.unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn test_archive_subtracts_bill_from_rollups() {
    let app = TestApp::new().await;
    let kept_doc = app.documentation().await;
    let archived_doc = app.documentation().await;

    let kept = app
        .engine
        .create_bill(app.create_input(kept_doc, &[(app.catalog.cbc, "1")]))
        .await
        .unwrap()
        .bill;
    let gone = app
        .engine
        .create_bill(app.create_input(archived_doc, &[(app.catalog.xray, "2")]))
        .await
        .unwrap()
        .bill;

    app.engine.archive_bill(archive(gone.bill_id)).await.unwrap();

    let day = app.engine.day_boundary().day_of(kept.created_utc);
    let report = &app.engine.daily_analytics(day, day).await.unwrap()[0];
    assert_eq!(report.summary.total_revenue, kept.total_amount);
    assert_eq!(report.summary.total_bills, 1);
    assert_eq!(report.summary.unpaid_bills, 1);
    assert_eq!(report.summary.total_services, 1);

    let imaging = report
        .categories
        .iter()
        .find(|c| c.service_category == "imaging")
        .unwrap();
    assert_eq!(imaging.total_revenue, Decimal::ZERO);
    assert_eq!(imaging.total_quantity, Decimal::ZERO);
}

#[tokio::test]
async fn test_archive_is_audited_and_trail_survives() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;
    let bill_id = app
        .engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "1")]))
        .await
        .unwrap()
        .bill
        .bill_id;

    app.engine.archive_bill(archive(bill_id)).await.unwrap();

    let trail = app.engine.audit_trail(bill_id).await.unwrap();
    let entry = trail.bill_entries.last().unwrap();
    assert_eq!(entry.action(), AuditAction::ColdArchived);
    assert_eq!(
        entry.new_data.as_ref().unwrap()["exportPath"],
        "s3://clinic-archive/2026/bills.parquet"
    );
    let previous = entry.previous_data.as_ref().unwrap();
    assert_eq!(previous["bill"]["billId"], bill_id.to_string());
    assert_eq!(previous["services"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_archive_requires_export_path() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;
    let bill_id = app
        .engine
        .create_bill(app.create_input(doc, &[]))
        .await
        .unwrap()
        .bill
        .bill_id;

    let mut input = archive(bill_id);
    input.export_path = "  ".to_string();
    let err = app.engine.archive_bill(input).await.unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
    assert!(app.engine.get_bill(bill_id).await.is_ok());
}

#[tokio::test]
async fn test_archive_of_unknown_bill_is_not_found() {
    let app = TestApp::new().await;

    let err = app.engine.archive_bill(archive(Uuid::new_v4())).await.unwrap_err();

    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_archive_leaves_everything_in_place() {
    let app = TestApp::new().await;
    let doc = app.documentation().await;
    let bill_id = app
        .engine
        .create_bill(app.create_input(doc, &[(app.catalog.cbc, "1")]))
        .await
        .unwrap()
        .bill
        .bill_id;

    app.store.set_analytics_failure(true);
    let err = app.engine.archive_bill(archive(bill_id)).await.unwrap_err();
    app.store.set_analytics_failure(false);

    assert!(matches!(err, BillingError::StorageFailure(_)));
    let details = app.engine.get_bill(bill_id).await.unwrap();
    assert_eq!(details.services.len(), 1);
    let trail = app.engine.audit_trail(bill_id).await.unwrap();
    assert!(trail
        .bill_entries
        .iter()
        .all(|e| e.action() != AuditAction::ColdArchived));
}

//! PostgreSQL-backed tests for the billing store.
//!
//! Run only when TEST_DATABASE_URL is set; each test gets its own schema.

mod common;

use clinic_billing_service::billing::{
    ArchiveBill, BillingEngine, CreateBill, DayBoundary, RecordPayment,
};
use clinic_billing_service::error::BillingError;
use clinic_billing_service::models::{PaymentMethod, PaymentStatus, ServiceLineInput};
use clinic_billing_service::services::{BillingStore, Database};
use common::{actor, dec};
use serial_test::serial;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

struct PgFixture {
    engine: BillingEngine,
    db: Database,
    service_id: Uuid,
    urinalysis_id: Uuid,
    documentation_id: Uuid,
}

async fn setup() -> Option<PgFixture> {
    let base_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        }
    };

    let schema_name = format!(
        "test_clinic_billing_{}_{}",
        std::process::id(),
        SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&base_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
        .execute(&pool)
        .await
        .ok();
    sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
        .execute(&pool)
        .await
        .expect("Failed to create test schema");
    pool.close().await;

    let separator = if base_url.contains('?') { "&" } else { "?" };
    let url = format!(
        "{}{}options=-c search_path%3D{}",
        base_url, separator, schema_name
    );
    let db = Database::new(&url, 2, 0).await.expect("Failed to connect");
    db.run_migrations().await.expect("Failed to run migrations");

    let service_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO services (service_id, name, category, price) VALUES ($1, $2, $3, $4)",
    )
    .bind(service_id)
    .bind("Chest X-Ray")
    .bind("imaging")
    .bind(dec("500.00"))
    .execute(db.pool())
    .await
    .expect("Failed to seed service");

    let urinalysis_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO services (service_id, name, category, price) VALUES ($1, $2, $3, $4)",
    )
    .bind(urinalysis_id)
    .bind("Urinalysis")
    .bind("laboratory")
    .bind(dec("333.333"))
    .execute(db.pool())
    .await
    .expect("Failed to seed service");

    let patient_id = Uuid::new_v4();
    sqlx::query("INSERT INTO patients (patient_id, first_name, last_name) VALUES ($1, $2, $3)")
        .bind(patient_id)
        .bind("Juan")
        .bind("Dela Cruz")
        .execute(db.pool())
        .await
        .expect("Failed to seed patient");

    let documentation_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO medical_documentations (documentation_id, patient_id, status) VALUES ($1, $2, 'finalized')",
    )
    .bind(documentation_id)
    .bind(patient_id)
    .execute(db.pool())
    .await
    .expect("Failed to seed documentation");

    let store: Arc<dyn BillingStore> = Arc::new(db.clone());
    Some(PgFixture {
        engine: BillingEngine::new(store, DayBoundary::utc(), Duration::from_secs(30)),
        db,
        service_id,
        urinalysis_id,
        documentation_id,
    })
}

fn create_input(fixture: &PgFixture) -> CreateBill {
    CreateBill {
        documentation_id: fixture.documentation_id,
        services: vec![ServiceLineInput {
            service_id: fixture.service_id,
            quantity: dec("2"),
        }],
        notes: None,
        initial_payment_amount: Some(dec("250")),
        payment_method: None,
        consultation_fee: None,
        is_senior_pwd_discount_applied: None,
        discount_rate: None,
        cleanup_documentation_on_failure: false,
        actor: actor(),
    }
}

#[tokio::test]
#[serial]
async fn test_bill_round_trips_through_postgres() {
    let Some(fixture) = setup().await else {
        return;
    };

    let created = fixture.engine.create_bill(create_input(&fixture)).await.unwrap();
    assert_eq!(created.bill.total_amount, dec("1250"));

    let paid = fixture
        .engine
        .record_payment(RecordPayment {
            bill_id: created.bill.bill_id,
            amount: dec("1000"),
            payment_method: PaymentMethod::Card,
            notes: None,
            actor: actor(),
        })
        .await
        .unwrap();
    assert_eq!(paid.details.bill.status(), PaymentStatus::Paid);

    let stored = fixture.engine.get_bill(created.bill.bill_id).await.unwrap();
    assert_eq!(stored.payments.len(), 2);
    assert_eq!(stored.bill.amount_paid, dec("1250"));

    let day = fixture.engine.day_boundary().day_of(created.bill.created_utc);
    let reports = fixture.engine.daily_analytics(day, day).await.unwrap();
    assert_eq!(reports[0].summary.paid_bills, 1);
    assert_eq!(reports[0].summary.unpaid_bills, 0);
}

#[tokio::test]
#[serial]
async fn test_catalog_price_precision_survives_storage() {
    let Some(fixture) = setup().await else {
        return;
    };

    let mut input = create_input(&fixture);
    input.services = vec![ServiceLineInput {
        service_id: fixture.urinalysis_id,
        quantity: dec("3"),
    }];
    input.initial_payment_amount = None;
    let created = fixture.engine.create_bill(input).await.unwrap();

    let stored = fixture.engine.get_bill(created.bill.bill_id).await.unwrap();
    let line = &stored.services[0];
    assert_eq!(line.service_price_at_time, dec("333.333"));
    assert_eq!(line.subtotal, dec("1000.00"));
    assert_eq!(stored.bill.total_amount, dec("1250.00"));
}

#[tokio::test]
#[serial]
async fn test_duplicate_bill_is_a_conflict() {
    let Some(fixture) = setup().await else {
        return;
    };

    fixture.engine.create_bill(create_input(&fixture)).await.unwrap();
    let err = fixture
        .engine
        .create_bill(create_input(&fixture))
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Conflict(_)));
}

#[tokio::test]
#[serial]
async fn test_archive_deletes_rows_and_keeps_audit() {
    let Some(fixture) = setup().await else {
        return;
    };

    let bill_id = fixture
        .engine
        .create_bill(create_input(&fixture))
        .await
        .unwrap()
        .bill
        .bill_id;
    let archived = fixture
        .engine
        .archive_bill(ArchiveBill {
            bill_id,
            export_path: "s3://clinic-archive/test.parquet".to_string(),
            actor: actor(),
        })
        .await
        .unwrap();
    assert_eq!(archived.payments_removed, 1);

    let (remaining,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM billed_services WHERE bill_id = $1")
            .bind(bill_id)
            .fetch_one(fixture.db.pool())
            .await
            .unwrap();
    assert_eq!(remaining, 0);

    let trail = fixture.engine.audit_trail(bill_id).await.unwrap();
    assert!(!trail.bill_entries.is_empty());
    assert_eq!(trail.service_entries.len(), 1);
}

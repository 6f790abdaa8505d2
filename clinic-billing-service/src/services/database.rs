//! PostgreSQL store for clinic-billing-service.

use crate::error::{BillingError, BillingResult};
use crate::models::{
    BillAuditLog, BilledService, BilledServiceAuditLog, CategorySalesAnalytics,
    DailySalesAnalytics, MedicalBill, MedicalDocumentation, Patient, PaymentHistory, Service,
    ServiceDelta, ServiceSalesAnalytics,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{BillingStore, BillingTx, UnsettledBill};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Map a driver error onto the billing taxonomy.
///
/// Unique violations are conflicts, foreign-key violations mean a referenced
/// row is missing, everything else is a storage failure.
fn classify(action: &str, e: sqlx::Error) -> BillingError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            BillingError::conflict(format!("Failed to {}: record already exists", action))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            BillingError::not_found(format!("Failed to {}: referenced record not found", action))
        }
        _ => BillingError::storage(anyhow::anyhow!("Failed to {}: {}", action, e)),
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "clinic-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl BillingStore for Database {
    async fn begin(&self) -> BillingResult<Box<dyn BillingTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify("begin transaction", e))?;
        Ok(Box::new(PgBillingTx { tx }))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| classify("run health check", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_unsettled_bills(&self) -> BillingResult<Vec<UnsettledBill>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unsettled_bills"])
            .start_timer();

        let bills = sqlx::query_as::<_, MedicalBill>(
            r#"
            SELECT bill_id, documentation_id, consultation_fee, is_senior_pwd_discount_applied, discount_rate, total_amount, amount_paid, balance, payment_status, notes, created_by_name, created_by_role, updated_by_name, updated_by_role, created_utc, updated_utc
            FROM medical_bills
            WHERE payment_status <> 'paid'
            ORDER BY created_utc ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list unsettled bills", e))?;

        let documentation_ids: Vec<Uuid> = bills.iter().map(|b| b.documentation_id).collect();
        let documentations = sqlx::query_as::<_, MedicalDocumentation>(
            r#"
            SELECT documentation_id, patient_id, status, created_utc
            FROM medical_documentations
            WHERE documentation_id = ANY($1)
            "#,
        )
        .bind(&documentation_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("load documentations", e))?;

        let patient_ids: Vec<Uuid> = documentations.iter().map(|d| d.patient_id).collect();
        let patients = sqlx::query_as::<_, Patient>(
            r#"
            SELECT patient_id, first_name, last_name, senior_pwd_id
            FROM patients
            WHERE patient_id = ANY($1)
            "#,
        )
        .bind(&patient_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("load patients", e))?;

        timer.observe_duration();

        let documentations: HashMap<Uuid, MedicalDocumentation> = documentations
            .into_iter()
            .map(|d| (d.documentation_id, d))
            .collect();
        let patients: HashMap<Uuid, Patient> =
            patients.into_iter().map(|p| (p.patient_id, p)).collect();

        Ok(bills
            .into_iter()
            .filter_map(|bill| {
                let documentation = documentations.get(&bill.documentation_id)?.clone();
                let patient = patients.get(&documentation.patient_id)?.clone();
                Some(UnsettledBill {
                    bill,
                    documentation,
                    patient,
                })
            })
            .collect())
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn list_bill_audit_logs(&self, bill_id: Uuid) -> BillingResult<Vec<BillAuditLog>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bill_audit_logs"])
            .start_timer();

        let entries = sqlx::query_as::<_, BillAuditLog>(
            r#"
            SELECT audit_id, bill_id, action, fields_changed, previous_data, new_data, actor_name, actor_role, created_utc
            FROM bill_audit_logs
            WHERE bill_id = $1
            ORDER BY created_utc ASC, sequence_no ASC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list bill audit logs", e))?;

        timer.observe_duration();

        Ok(entries)
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn list_billed_service_audit_logs(
        &self,
        bill_id: Uuid,
    ) -> BillingResult<Vec<BilledServiceAuditLog>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_billed_service_audit_logs"])
            .start_timer();

        let entries = sqlx::query_as::<_, BilledServiceAuditLog>(
            r#"
            SELECT audit_id, billed_service_id, bill_id, action, fields_changed, previous_data, new_data, actor_name, actor_role, created_utc
            FROM billed_service_audit_logs
            WHERE bill_id = $1
            ORDER BY created_utc ASC, sequence_no ASC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list billed service audit logs", e))?;

        timer.observe_duration();

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn list_daily_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<DailySalesAnalytics>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_daily_analytics"])
            .start_timer();

        let rows = sqlx::query_as::<_, DailySalesAnalytics>(
            r#"
            SELECT sales_date, total_revenue, total_bills, paid_bills, partially_paid_bills, unpaid_bills, total_services, average_bill_amount, updated_utc
            FROM daily_sales_analytics
            WHERE sales_date BETWEEN $1 AND $2
            ORDER BY sales_date ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list daily analytics", e))?;

        timer.observe_duration();

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn list_service_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<ServiceSalesAnalytics>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_service_analytics"])
            .start_timer();

        let rows = sqlx::query_as::<_, ServiceSalesAnalytics>(
            r#"
            SELECT sales_date, service_id, service_name, service_category, total_revenue, total_quantity, updated_utc
            FROM service_sales_analytics
            WHERE sales_date BETWEEN $1 AND $2
            ORDER BY sales_date ASC, service_name ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list service analytics", e))?;

        timer.observe_duration();

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn list_category_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<CategorySalesAnalytics>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_category_analytics"])
            .start_timer();

        let rows = sqlx::query_as::<_, CategorySalesAnalytics>(
            r#"
            SELECT sales_date, service_category, total_revenue, total_quantity, updated_utc
            FROM category_sales_analytics
            WHERE sales_date BETWEEN $1 AND $2
            ORDER BY sales_date ASC, service_category ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list category analytics", e))?;

        timer.observe_duration();

        Ok(rows)
    }
}

/// One PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgBillingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingTx for PgBillingTx {
    async fn set_statement_timeout(&mut self, timeout: Duration) -> BillingResult<()> {
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(timeout.as_millis().to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("set statement timeout", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(documentation_id = %documentation_id))]
    async fn get_documentation(
        &mut self,
        documentation_id: Uuid,
    ) -> BillingResult<Option<MedicalDocumentation>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_documentation"])
            .start_timer();

        let documentation = sqlx::query_as::<_, MedicalDocumentation>(
            r#"
            SELECT documentation_id, patient_id, status, created_utc
            FROM medical_documentations
            WHERE documentation_id = $1
            "#,
        )
        .bind(documentation_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify("get documentation", e))?;

        timer.observe_duration();

        Ok(documentation)
    }

    #[instrument(skip(self), fields(documentation_id = %documentation_id))]
    async fn delete_documentation(&mut self, documentation_id: Uuid) -> BillingResult<bool> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_documentation"])
            .start_timer();

        let result = sqlx::query("DELETE FROM medical_documentations WHERE documentation_id = $1")
            .bind(documentation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("delete documentation", e))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(patient_id = %patient_id))]
    async fn get_patient(&mut self, patient_id: Uuid) -> BillingResult<Option<Patient>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_patient"])
            .start_timer();

        let patient = sqlx::query_as::<_, Patient>(
            r#"
            SELECT patient_id, first_name, last_name, senior_pwd_id
            FROM patients
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify("get patient", e))?;

        timer.observe_duration();

        Ok(patient)
    }

    #[instrument(skip(self), fields(service_id = %service_id))]
    async fn get_service(&mut self, service_id: Uuid) -> BillingResult<Option<Service>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_service"])
            .start_timer();

        let service = sqlx::query_as::<_, Service>(
            r#"
            SELECT service_id, name, category, price, is_activated, is_available, created_utc, updated_utc
            FROM services
            WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify("get service", e))?;

        timer.observe_duration();

        Ok(service)
    }

    #[instrument(skip(self), fields(documentation_id = %documentation_id))]
    async fn find_bill_by_documentation(
        &mut self,
        documentation_id: Uuid,
    ) -> BillingResult<Option<MedicalBill>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_bill_by_documentation"])
            .start_timer();

        let bill = sqlx::query_as::<_, MedicalBill>(
            r#"
            SELECT bill_id, documentation_id, consultation_fee, is_senior_pwd_discount_applied, discount_rate, total_amount, amount_paid, balance, payment_status, notes, created_by_name, created_by_role, updated_by_name, updated_by_role, created_utc, updated_utc
            FROM medical_bills
            WHERE documentation_id = $1
            "#,
        )
        .bind(documentation_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify("find bill by documentation", e))?;

        timer.observe_duration();

        Ok(bill)
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn get_bill(&mut self, bill_id: Uuid) -> BillingResult<Option<MedicalBill>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, MedicalBill>(
            r#"
            SELECT bill_id, documentation_id, consultation_fee, is_senior_pwd_discount_applied, discount_rate, total_amount, amount_paid, balance, payment_status, notes, created_by_name, created_by_role, updated_by_name, updated_by_role, created_utc, updated_utc
            FROM medical_bills
            WHERE bill_id = $1
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify("get bill", e))?;

        timer.observe_duration();

        Ok(bill)
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn lock_bill(&mut self, bill_id: Uuid) -> BillingResult<Option<MedicalBill>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, MedicalBill>(
            r#"
            SELECT bill_id, documentation_id, consultation_fee, is_senior_pwd_discount_applied, discount_rate, total_amount, amount_paid, balance, payment_status, notes, created_by_name, created_by_role, updated_by_name, updated_by_role, created_utc, updated_utc
            FROM medical_bills
            WHERE bill_id = $1
            FOR UPDATE
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify("lock bill", e))?;

        timer.observe_duration();

        Ok(bill)
    }

    #[instrument(skip(self, bill), fields(bill_id = %bill.bill_id))]
    async fn insert_bill(&mut self, bill: &MedicalBill) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_bill"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO medical_bills (bill_id, documentation_id, consultation_fee, is_senior_pwd_discount_applied, discount_rate, total_amount, amount_paid, balance, payment_status, notes, created_by_name, created_by_role, updated_by_name, updated_by_role, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(bill.bill_id)
        .bind(bill.documentation_id)
        .bind(bill.consultation_fee)
        .bind(bill.is_senior_pwd_discount_applied)
        .bind(bill.discount_rate)
        .bind(bill.total_amount)
        .bind(bill.amount_paid)
        .bind(bill.balance)
        .bind(&bill.payment_status)
        .bind(&bill.notes)
        .bind(&bill.created_by_name)
        .bind(&bill.created_by_role)
        .bind(&bill.updated_by_name)
        .bind(&bill.updated_by_role)
        .bind(bill.created_utc)
        .bind(bill.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("insert bill", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, bill), fields(bill_id = %bill.bill_id))]
    async fn update_bill(&mut self, bill: &MedicalBill) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_bill"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE medical_bills
            SET is_senior_pwd_discount_applied = $2, discount_rate = $3, total_amount = $4, amount_paid = $5, balance = $6, payment_status = $7, notes = $8, updated_by_name = $9, updated_by_role = $10, updated_utc = $11
            WHERE bill_id = $1
            "#,
        )
        .bind(bill.bill_id)
        .bind(bill.is_senior_pwd_discount_applied)
        .bind(bill.discount_rate)
        .bind(bill.total_amount)
        .bind(bill.amount_paid)
        .bind(bill.balance)
        .bind(&bill.payment_status)
        .bind(&bill.notes)
        .bind(&bill.updated_by_name)
        .bind(&bill.updated_by_role)
        .bind(bill.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("update bill", e))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(BillingError::not_found("Bill not found"));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn delete_bill(&mut self, bill_id: Uuid) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_bill"])
            .start_timer();

        sqlx::query("DELETE FROM medical_bills WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("delete bill", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn list_billed_services(&mut self, bill_id: Uuid) -> BillingResult<Vec<BilledService>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_billed_services"])
            .start_timer();

        let lines = sqlx::query_as::<_, BilledService>(
            r#"
            SELECT billed_service_id, bill_id, service_id, service_name, service_category, service_price_at_time, quantity, subtotal, created_utc
            FROM billed_services
            WHERE bill_id = $1
            ORDER BY created_utc ASC, sequence_no ASC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| classify("list billed services", e))?;

        timer.observe_duration();

        Ok(lines)
    }

    #[instrument(skip(self, line), fields(bill_id = %line.bill_id, service_id = %line.service_id))]
    async fn insert_billed_service(&mut self, line: &BilledService) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_billed_service"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO billed_services (billed_service_id, bill_id, service_id, service_name, service_category, service_price_at_time, quantity, subtotal, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(line.billed_service_id)
        .bind(line.bill_id)
        .bind(line.service_id)
        .bind(&line.service_name)
        .bind(&line.service_category)
        .bind(line.service_price_at_time)
        .bind(line.quantity)
        .bind(line.subtotal)
        .bind(line.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("insert billed service", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, line), fields(billed_service_id = %line.billed_service_id))]
    async fn update_billed_service(&mut self, line: &BilledService) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_billed_service"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE billed_services
            SET quantity = $2, subtotal = $3
            WHERE billed_service_id = $1
            "#,
        )
        .bind(line.billed_service_id)
        .bind(line.quantity)
        .bind(line.subtotal)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("update billed service", e))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(BillingError::not_found("Billed service not found"));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(billed_service_id = %billed_service_id))]
    async fn delete_billed_service(&mut self, billed_service_id: Uuid) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_billed_service"])
            .start_timer();

        sqlx::query("DELETE FROM billed_services WHERE billed_service_id = $1")
            .bind(billed_service_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("delete billed service", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, payment), fields(bill_id = %payment.bill_id))]
    async fn insert_payment(&mut self, payment: &PaymentHistory) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payment_history (payment_id, bill_id, amount, payment_method, notes, recorded_by_name, recorded_by_role, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.bill_id)
        .bind(payment.amount)
        .bind(&payment.payment_method)
        .bind(&payment.notes)
        .bind(&payment.recorded_by_name)
        .bind(&payment.recorded_by_role)
        .bind(payment.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("insert payment", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn list_payments(&mut self, bill_id: Uuid) -> BillingResult<Vec<PaymentHistory>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, PaymentHistory>(
            r#"
            SELECT payment_id, bill_id, amount, payment_method, notes, recorded_by_name, recorded_by_role, created_utc
            FROM payment_history
            WHERE bill_id = $1
            ORDER BY created_utc ASC, sequence_no ASC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| classify("list payments", e))?;

        timer.observe_duration();

        Ok(payments)
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn sum_payments(&mut self, bill_id: Uuid) -> BillingResult<Decimal> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sum_payments"])
            .start_timer();

        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payment_history WHERE bill_id = $1",
        )
        .bind(bill_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| classify("sum payments", e))?;

        timer.observe_duration();

        Ok(total)
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn delete_payments(&mut self, bill_id: Uuid) -> BillingResult<u64> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payments"])
            .start_timer();

        let result = sqlx::query("DELETE FROM payment_history WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("delete payments", e))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, entry), fields(bill_id = %entry.bill_id, action = %entry.action))]
    async fn insert_bill_audit(&mut self, entry: &BillAuditLog) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_bill_audit"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO bill_audit_logs (audit_id, bill_id, action, fields_changed, previous_data, new_data, actor_name, actor_role, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.audit_id)
        .bind(entry.bill_id)
        .bind(&entry.action)
        .bind(&entry.fields_changed)
        .bind(&entry.previous_data)
        .bind(&entry.new_data)
        .bind(&entry.actor_name)
        .bind(&entry.actor_role)
        .bind(entry.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("insert bill audit log", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, entry), fields(billed_service_id = %entry.billed_service_id, action = %entry.action))]
    async fn insert_billed_service_audit(
        &mut self,
        entry: &BilledServiceAuditLog,
    ) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_billed_service_audit"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO billed_service_audit_logs (audit_id, billed_service_id, bill_id, action, fields_changed, previous_data, new_data, actor_name, actor_role, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.audit_id)
        .bind(entry.billed_service_id)
        .bind(entry.bill_id)
        .bind(&entry.action)
        .bind(&entry.fields_changed)
        .bind(&entry.previous_data)
        .bind(&entry.new_data)
        .bind(&entry.actor_name)
        .bind(&entry.actor_role)
        .bind(entry.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("insert billed service audit log", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(sales_date = %date))]
    async fn lock_daily_analytics(
        &mut self,
        date: NaiveDate,
    ) -> BillingResult<DailySalesAnalytics> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_daily_analytics"])
            .start_timer();

        sqlx::query(
            "INSERT INTO daily_sales_analytics (sales_date) VALUES ($1) ON CONFLICT (sales_date) DO NOTHING",
        )
        .bind(date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("ensure daily analytics", e))?;

        let row = sqlx::query_as::<_, DailySalesAnalytics>(
            r#"
            SELECT sales_date, total_revenue, total_bills, paid_bills, partially_paid_bills, unpaid_bills, total_services, average_bill_amount, updated_utc
            FROM daily_sales_analytics
            WHERE sales_date = $1
            FOR UPDATE
            "#,
        )
        .bind(date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| classify("lock daily analytics", e))?;

        timer.observe_duration();

        Ok(row)
    }

    async fn save_daily_analytics(&mut self, row: &DailySalesAnalytics) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_daily_analytics"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE daily_sales_analytics
            SET total_revenue = $2, total_bills = $3, paid_bills = $4, partially_paid_bills = $5, unpaid_bills = $6, total_services = $7, average_bill_amount = $8, updated_utc = $9
            WHERE sales_date = $1
            "#,
        )
        .bind(row.sales_date)
        .bind(row.total_revenue)
        .bind(row.total_bills)
        .bind(row.paid_bills)
        .bind(row.partially_paid_bills)
        .bind(row.unpaid_bills)
        .bind(row.total_services)
        .bind(row.average_bill_amount)
        .bind(row.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("save daily analytics", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, service), fields(sales_date = %date, service_id = %service.service_id))]
    async fn lock_service_analytics(
        &mut self,
        date: NaiveDate,
        service: &ServiceDelta,
    ) -> BillingResult<ServiceSalesAnalytics> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_service_analytics"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO service_sales_analytics (sales_date, service_id, service_name, service_category)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sales_date, service_id) DO NOTHING
            "#,
        )
        .bind(date)
        .bind(service.service_id)
        .bind(&service.service_name)
        .bind(&service.service_category)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("ensure service analytics", e))?;

        let row = sqlx::query_as::<_, ServiceSalesAnalytics>(
            r#"
            SELECT sales_date, service_id, service_name, service_category, total_revenue, total_quantity, updated_utc
            FROM service_sales_analytics
            WHERE sales_date = $1 AND service_id = $2
            FOR UPDATE
            "#,
        )
        .bind(date)
        .bind(service.service_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| classify("lock service analytics", e))?;

        timer.observe_duration();

        Ok(row)
    }

    async fn save_service_analytics(&mut self, row: &ServiceSalesAnalytics) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_service_analytics"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE service_sales_analytics
            SET total_revenue = $3, total_quantity = $4, updated_utc = $5
            WHERE sales_date = $1 AND service_id = $2
            "#,
        )
        .bind(row.sales_date)
        .bind(row.service_id)
        .bind(row.total_revenue)
        .bind(row.total_quantity)
        .bind(row.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("save service analytics", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(sales_date = %date))]
    async fn lock_category_analytics(
        &mut self,
        date: NaiveDate,
        service_category: &str,
    ) -> BillingResult<CategorySalesAnalytics> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_category_analytics"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO category_sales_analytics (sales_date, service_category)
            VALUES ($1, $2)
            ON CONFLICT (sales_date, service_category) DO NOTHING
            "#,
        )
        .bind(date)
        .bind(service_category)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("ensure category analytics", e))?;

        let row = sqlx::query_as::<_, CategorySalesAnalytics>(
            r#"
            SELECT sales_date, service_category, total_revenue, total_quantity, updated_utc
            FROM category_sales_analytics
            WHERE sales_date = $1 AND service_category = $2
            FOR UPDATE
            "#,
        )
        .bind(date)
        .bind(service_category)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| classify("lock category analytics", e))?;

        timer.observe_duration();

        Ok(row)
    }

    async fn save_category_analytics(
        &mut self,
        row: &CategorySalesAnalytics,
    ) -> BillingResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_category_analytics"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE category_sales_analytics
            SET total_revenue = $3, total_quantity = $4, updated_utc = $5
            WHERE sales_date = $1 AND service_category = $2
            "#,
        )
        .bind(row.sales_date)
        .bind(&row.service_category)
        .bind(row.total_revenue)
        .bind(row.total_quantity)
        .bind(row.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("save category analytics", e))?;

        timer.observe_duration();

        Ok(())
    }

    async fn commit(self: Box<Self>) -> BillingResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| classify("commit transaction", e))
    }
}

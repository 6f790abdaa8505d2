//! In-memory store.
//!
//! Backs tests and local runs without PostgreSQL. A unit of work holds the
//! state lock for its whole lifetime and edits a private copy; commit
//! publishes the copy, drop throws it away. Constraints mirror the SQL schema
//! (one bill per documentation, line items and payments need their bill).

use crate::error::{BillingError, BillingResult};
use crate::models::{
    BillAuditLog, BilledService, BilledServiceAuditLog, CategorySalesAnalytics,
    DailySalesAnalytics, MedicalBill, MedicalDocumentation, Patient, PaymentHistory,
    PaymentStatus, Service, ServiceDelta, ServiceSalesAnalytics,
};
use crate::services::store::{BillingStore, BillingTx, UnsettledBill};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Everything the store holds.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub services: HashMap<Uuid, Service>,
    pub documentations: HashMap<Uuid, MedicalDocumentation>,
    pub patients: HashMap<Uuid, Patient>,
    pub bills: HashMap<Uuid, MedicalBill>,
    pub billed_services: Vec<BilledService>,
    pub payments: Vec<PaymentHistory>,
    pub bill_audit_logs: Vec<BillAuditLog>,
    pub billed_service_audit_logs: Vec<BilledServiceAuditLog>,
    pub daily_analytics: BTreeMap<NaiveDate, DailySalesAnalytics>,
    pub service_analytics: BTreeMap<(NaiveDate, Uuid), ServiceSalesAnalytics>,
    pub category_analytics: BTreeMap<(NaiveDate, String), CategorySalesAnalytics>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_analytics: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_service(&self, service: Service) {
        self.state
            .lock()
            .await
            .services
            .insert(service.service_id, service);
    }

    pub async fn insert_documentation(&self, documentation: MedicalDocumentation) {
        self.state
            .lock()
            .await
            .documentations
            .insert(documentation.documentation_id, documentation);
    }

    pub async fn insert_patient(&self, patient: Patient) {
        self.state
            .lock()
            .await
            .patients
            .insert(patient.patient_id, patient);
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make every analytics write fail, to exercise best-effort paths.
    pub fn set_analytics_failure(&self, fail: bool) {
        self.fail_analytics.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn begin(&self) -> BillingResult<Box<dyn BillingTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_analytics: self.fail_analytics.load(Ordering::SeqCst),
        }))
    }

    async fn health_check(&self) -> BillingResult<()> {
        Ok(())
    }

    async fn list_unsettled_bills(&self) -> BillingResult<Vec<UnsettledBill>> {
        let state = self.state.lock().await;
        let mut bills: Vec<UnsettledBill> = state
            .bills
            .values()
            .filter(|b| b.status() != PaymentStatus::Paid)
            .filter_map(|bill| {
                let documentation = state.documentations.get(&bill.documentation_id)?;
                let patient = state.patients.get(&documentation.patient_id)?;
                Some(UnsettledBill {
                    bill: bill.clone(),
                    documentation: documentation.clone(),
                    patient: patient.clone(),
                })
            })
            .collect();
        bills.sort_by_key(|u| u.bill.created_utc);
        Ok(bills)
    }

    async fn list_bill_audit_logs(&self, bill_id: Uuid) -> BillingResult<Vec<BillAuditLog>> {
        let state = self.state.lock().await;
        Ok(state
            .bill_audit_logs
            .iter()
            .filter(|a| a.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn list_billed_service_audit_logs(
        &self,
        bill_id: Uuid,
    ) -> BillingResult<Vec<BilledServiceAuditLog>> {
        let state = self.state.lock().await;
        Ok(state
            .billed_service_audit_logs
            .iter()
            .filter(|a| a.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn list_daily_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<DailySalesAnalytics>> {
        let state = self.state.lock().await;
        Ok(state
            .daily_analytics
            .values()
            .filter(|row| row.sales_date >= start && row.sales_date <= end)
            .cloned()
            .collect())
    }

    async fn list_service_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<ServiceSalesAnalytics>> {
        let state = self.state.lock().await;
        Ok(state
            .service_analytics
            .values()
            .filter(|row| row.sales_date >= start && row.sales_date <= end)
            .cloned()
            .collect())
    }

    async fn list_category_analytics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BillingResult<Vec<CategorySalesAnalytics>> {
        let state = self.state.lock().await;
        Ok(state
            .category_analytics
            .values()
            .filter(|row| row.sales_date >= start && row.sales_date <= end)
            .cloned()
            .collect())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_analytics: bool,
}

impl MemoryTx {
    fn check_analytics(&self) -> BillingResult<()> {
        if self.fail_analytics {
            return Err(BillingError::storage(anyhow::anyhow!(
                "analytics storage unavailable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingTx for MemoryTx {
    async fn set_statement_timeout(&mut self, _timeout: Duration) -> BillingResult<()> {
        Ok(())
    }

    async fn get_documentation(
        &mut self,
        documentation_id: Uuid,
    ) -> BillingResult<Option<MedicalDocumentation>> {
        Ok(self.working.documentations.get(&documentation_id).cloned())
    }

    async fn delete_documentation(&mut self, documentation_id: Uuid) -> BillingResult<bool> {
        if self
            .working
            .bills
            .values()
            .any(|b| b.documentation_id == documentation_id)
        {
            return Err(BillingError::conflict(
                "Documentation is still referenced by a bill",
            ));
        }
        Ok(self.working.documentations.remove(&documentation_id).is_some())
    }

    async fn get_patient(&mut self, patient_id: Uuid) -> BillingResult<Option<Patient>> {
        Ok(self.working.patients.get(&patient_id).cloned())
    }

    async fn get_service(&mut self, service_id: Uuid) -> BillingResult<Option<Service>> {
        Ok(self.working.services.get(&service_id).cloned())
    }

    async fn find_bill_by_documentation(
        &mut self,
        documentation_id: Uuid,
    ) -> BillingResult<Option<MedicalBill>> {
        Ok(self
            .working
            .bills
            .values()
            .find(|b| b.documentation_id == documentation_id)
            .cloned())
    }

    async fn get_bill(&mut self, bill_id: Uuid) -> BillingResult<Option<MedicalBill>> {
        Ok(self.working.bills.get(&bill_id).cloned())
    }

    async fn lock_bill(&mut self, bill_id: Uuid) -> BillingResult<Option<MedicalBill>> {
        // The whole store is already held by this unit of work.
        self.get_bill(bill_id).await
    }

    async fn insert_bill(&mut self, bill: &MedicalBill) -> BillingResult<()> {
        if self
            .working
            .bills
            .values()
            .any(|b| b.documentation_id == bill.documentation_id)
        {
            return Err(BillingError::conflict(
                "A bill already exists for this documentation",
            ));
        }
        if !self
            .working
            .documentations
            .contains_key(&bill.documentation_id)
        {
            return Err(BillingError::not_found("Documentation not found"));
        }
        self.working.bills.insert(bill.bill_id, bill.clone());
        Ok(())
    }

    async fn update_bill(&mut self, bill: &MedicalBill) -> BillingResult<()> {
        match self.working.bills.get_mut(&bill.bill_id) {
            Some(existing) => {
                *existing = bill.clone();
                Ok(())
            }
            None => Err(BillingError::not_found("Bill not found")),
        }
    }

    async fn delete_bill(&mut self, bill_id: Uuid) -> BillingResult<()> {
        self.working.bills.remove(&bill_id);
        self.working.billed_services.retain(|l| l.bill_id != bill_id);
        self.working.payments.retain(|p| p.bill_id != bill_id);
        Ok(())
    }

    async fn list_billed_services(&mut self, bill_id: Uuid) -> BillingResult<Vec<BilledService>> {
        Ok(self
            .working
            .billed_services
            .iter()
            .filter(|l| l.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn insert_billed_service(&mut self, line: &BilledService) -> BillingResult<()> {
        if !self.working.bills.contains_key(&line.bill_id) {
            return Err(BillingError::not_found("Bill not found"));
        }
        self.working.billed_services.push(line.clone());
        Ok(())
    }

    async fn update_billed_service(&mut self, line: &BilledService) -> BillingResult<()> {
        match self
            .working
            .billed_services
            .iter_mut()
            .find(|l| l.billed_service_id == line.billed_service_id)
        {
            Some(existing) => {
                *existing = line.clone();
                Ok(())
            }
            None => Err(BillingError::not_found("Billed service not found")),
        }
    }

    async fn delete_billed_service(&mut self, billed_service_id: Uuid) -> BillingResult<()> {
        self.working
            .billed_services
            .retain(|l| l.billed_service_id != billed_service_id);
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &PaymentHistory) -> BillingResult<()> {
        if !self.working.bills.contains_key(&payment.bill_id) {
            return Err(BillingError::not_found("Bill not found"));
        }
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn list_payments(&mut self, bill_id: Uuid) -> BillingResult<Vec<PaymentHistory>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn sum_payments(&mut self, bill_id: Uuid) -> BillingResult<Decimal> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.bill_id == bill_id)
            .map(|p| p.amount)
            .sum())
    }

    async fn delete_payments(&mut self, bill_id: Uuid) -> BillingResult<u64> {
        let before = self.working.payments.len();
        self.working.payments.retain(|p| p.bill_id != bill_id);
        Ok((before - self.working.payments.len()) as u64)
    }

    async fn insert_bill_audit(&mut self, entry: &BillAuditLog) -> BillingResult<()> {
        self.working.bill_audit_logs.push(entry.clone());
        Ok(())
    }

    async fn insert_billed_service_audit(
        &mut self,
        entry: &BilledServiceAuditLog,
    ) -> BillingResult<()> {
        self.working.billed_service_audit_logs.push(entry.clone());
        Ok(())
    }

    async fn lock_daily_analytics(
        &mut self,
        date: NaiveDate,
    ) -> BillingResult<DailySalesAnalytics> {
        self.check_analytics()?;
        Ok(self
            .working
            .daily_analytics
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailySalesAnalytics::empty(date)))
    }

    async fn save_daily_analytics(&mut self, row: &DailySalesAnalytics) -> BillingResult<()> {
        self.check_analytics()?;
        self.working
            .daily_analytics
            .insert(row.sales_date, row.clone());
        Ok(())
    }

    async fn lock_service_analytics(
        &mut self,
        date: NaiveDate,
        service: &ServiceDelta,
    ) -> BillingResult<ServiceSalesAnalytics> {
        self.check_analytics()?;
        Ok(self
            .working
            .service_analytics
            .get(&(date, service.service_id))
            .cloned()
            .unwrap_or_else(|| ServiceSalesAnalytics::empty(date, service)))
    }

    async fn save_service_analytics(&mut self, row: &ServiceSalesAnalytics) -> BillingResult<()> {
        self.check_analytics()?;
        self.working
            .service_analytics
            .insert((row.sales_date, row.service_id), row.clone());
        Ok(())
    }

    async fn lock_category_analytics(
        &mut self,
        date: NaiveDate,
        service_category: &str,
    ) -> BillingResult<CategorySalesAnalytics> {
        self.check_analytics()?;
        Ok(self
            .working
            .category_analytics
            .get(&(date, service_category.to_string()))
            .cloned()
            .unwrap_or_else(|| CategorySalesAnalytics::empty(date, service_category)))
    }

    async fn save_category_analytics(
        &mut self,
        row: &CategorySalesAnalytics,
    ) -> BillingResult<()> {
        self.check_analytics()?;
        self.working.category_analytics.insert(
            (row.sales_date, row.service_category.clone()),
            row.clone(),
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BillingResult<()> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn documentation() -> MedicalDocumentation {
        MedicalDocumentation {
            documentation_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            status: "finalized".to_string(),
            created_utc: Utc::now(),
        }
    }

    fn bill_for(documentation_id: Uuid) -> MedicalBill {
        let now = Utc::now();
        MedicalBill {
            bill_id: Uuid::new_v4(),
            documentation_id,
            consultation_fee: Decimal::from(250),
            is_senior_pwd_discount_applied: false,
            discount_rate: Decimal::ZERO,
            total_amount: Decimal::from(250),
            amount_paid: Decimal::ZERO,
            balance: Decimal::from(250),
            payment_status: "unpaid".to_string(),
            notes: None,
            created_by_name: "Front Desk".to_string(),
            created_by_role: "staff".to_string(),
            updated_by_name: None,
            updated_by_role: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();
        let doc = documentation();
        store.insert_documentation(doc.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_bill(&bill_for(doc.documentation_id)).await.unwrap();
        }

        assert!(store.snapshot().await.bills.is_empty());
    }

    #[tokio::test]
    async fn committed_unit_of_work_is_visible() {
        let store = MemoryStore::new();
        let doc = documentation();
        store.insert_documentation(doc.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_bill(&bill_for(doc.documentation_id)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot().await.bills.len(), 1);
    }

    #[tokio::test]
    async fn second_bill_for_documentation_conflicts() {
        let store = MemoryStore::new();
        let doc = documentation();
        store.insert_documentation(doc.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_bill(&bill_for(doc.documentation_id)).await.unwrap();
        let err = tx
            .insert_bill(&bill_for(doc.documentation_id))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Conflict(_)));
    }
}

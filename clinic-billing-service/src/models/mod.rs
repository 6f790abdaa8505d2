//! Domain models for clinic-billing-service.

mod analytics;
mod audit;
mod bill;
mod billed_service;
mod catalog;
mod documentation;
mod payment;

pub use analytics::{
    AnalyticsDelta, CategoryDelta, CategorySalesAnalytics, DailySalesAnalytics, ServiceDelta,
    ServiceSalesAnalytics, StatusBucketDeltas,
};
pub use audit::{AuditAction, BillAuditLog, BilledServiceAuditLog};
pub use bill::{Actor, MedicalBill, PaymentStatus};
pub use billed_service::{BilledService, QuantityUpdateInput, ServiceLineInput};
pub use catalog::{Service, ServiceCategory};
pub use documentation::{DocumentationStatus, MedicalDocumentation, Patient};
pub use payment::{PaymentHistory, PaymentMethod};

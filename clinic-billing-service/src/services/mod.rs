//! Persistence and metrics for the clinic billing service.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod store;

pub use database::Database;
pub use memory::{MemoryState, MemoryStore};
pub use metrics::{
    get_metrics, init_metrics, record_analytics_failure, record_bill_created, record_bill_update,
    record_error, record_payment,
};
pub use store::{BillingStore, BillingTx, UnsettledBill};

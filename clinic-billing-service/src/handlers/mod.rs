pub mod analytics;
pub mod bills;
pub mod health;
pub mod payments;

pub use analytics::daily_analytics;
pub use bills::{archive_bill, create_bill, get_audit_trail, get_bill, list_unsettled, update_bill};
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use payments::{list_payments, record_payment};

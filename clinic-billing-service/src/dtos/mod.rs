pub mod analytics;
pub mod bills;

pub use analytics::AnalyticsRangeQuery;
pub use bills::{
    ArchiveBillRequest, CreateBillRequest, RecordPaymentRequest, ServiceLineRequest,
    UpdateBillRequest,
};

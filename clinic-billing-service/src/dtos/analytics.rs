use chrono::NaiveDate;
use serde::Deserialize;

/// `?start=YYYY-MM-DD&end=YYYY-MM-DD`, both inclusive.
#[derive(Debug, Deserialize)]
pub struct AnalyticsRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

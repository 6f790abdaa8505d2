use crate::dtos::AnalyticsRangeQuery;
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

pub async fn daily_analytics(
    State(state): State<AppState>,
    Query(range): Query<AnalyticsRangeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = state.engine.daily_analytics(range.start, range.end).await?;
    Ok(Json(days))
}

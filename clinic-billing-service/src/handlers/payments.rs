use crate::dtos::RecordPaymentRequest;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn record_payment(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let recorded = state.engine.record_payment(req.into_input(bill_id)).await?;

    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payments = state.engine.payment_history(bill_id).await?;
    Ok(Json(payments))
}

use crate::dtos::{ArchiveBillRequest, CreateBillRequest, UpdateBillRequest};
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

pub async fn create_bill(
    State(state): State<AppState>,
    Json(req): Json<CreateBillRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let details = state.engine.create_bill(req.into()).await?;

    Ok((StatusCode::CREATED, Json(details)))
}

pub async fn get_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let details = state.engine.get_bill(bill_id).await?;
    Ok(Json(details))
}

pub async fn update_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Json(req): Json<UpdateBillRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let updated = state.engine.update_bill(req.into_input(bill_id)).await?;

    Ok(Json(updated))
}

pub async fn list_unsettled(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let bills = state.engine.unsettled_bills().await?;
    Ok(Json(bills))
}

pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let trail = state.engine.audit_trail(bill_id).await?;
    Ok(Json(trail))
}

pub async fn archive_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Json(req): Json<ArchiveBillRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let archived = state.engine.archive_bill(req.into_input(bill_id)).await?;

    Ok(Json(archived))
}

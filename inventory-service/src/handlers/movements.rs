use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    BulkMovementRequest, BulkOutcome, CreateMovement, EntryFilter, LedgerEntry, UpdateMovement,
};
use crate::services::StockError;
use crate::startup::AppState;

pub async fn create_movement(
    State(state): State<AppState>,
    Json(input): Json<CreateMovement>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.ledger.create_movement(input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_movements(
    State(state): State<AppState>,
    Query(filter): Query<EntryFilter>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(state.db.list_entries(&filter).await?))
}

pub async fn get_movement(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<LedgerEntry>, AppError> {
    let entry = state
        .db
        .get_entry(entry_id)
        .await?
        .ok_or_else(|| StockError::entry_not_found(entry_id))?;
    Ok(Json(entry))
}

pub async fn update_movement(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(patch): Json<UpdateMovement>,
) -> Result<Json<LedgerEntry>, AppError> {
    Ok(Json(state.ledger.update_movement(entry_id, patch).await?))
}

pub async fn delete_movement(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.ledger.delete_movement(entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// All lines or none. A rejected batch answers 422 listing every failing line.
pub async fn apply_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkMovementRequest>,
) -> Result<impl IntoResponse, AppError> {
    match state.ledger.apply_bulk(request).await? {
        BulkOutcome::Applied { entries } => Ok((
            StatusCode::CREATED,
            Json(json!({
                "lines_applied": entries.len(),
                "entries": entries,
            })),
        )),
        BulkOutcome::Rejected { failures } => Err(StockError::BulkRejected(failures).into()),
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{CreatePart, Part, UpdatePartDetails};
use crate::services::StockError;
use crate::startup::AppState;

const DEFAULT_PAGE_SIZE: i32 = 50;

#[derive(Debug, Deserialize)]
pub struct ListPartsQuery {
    #[serde(default)]
    pub include_archived: bool,
    pub page_size: Option<i32>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PartPage {
    pub parts: Vec<Part>,
    /// Business id of the last part, when another page may follow.
    pub next_page_token: Option<String>,
}

pub async fn create_part(
    State(state): State<AppState>,
    Json(input): Json<CreatePart>,
) -> Result<impl IntoResponse, AppError> {
    let part = state.db.create_part(&input).await?;
    Ok((StatusCode::CREATED, Json(part)))
}

pub async fn list_parts(
    State(state): State<AppState>,
    Query(query): Query<ListPartsQuery>,
) -> Result<Json<PartPage>, AppError> {
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);
    let parts = state
        .db
        .list_parts(query.include_archived, page_size, query.page_token.as_deref())
        .await?;

    let next_page_token = if parts.len() == page_size as usize {
        parts.last().map(|p| p.business_id.clone())
    } else {
        None
    };

    Ok(Json(PartPage {
        parts,
        next_page_token,
    }))
}

pub async fn list_low_stock(State(state): State<AppState>) -> Result<Json<Vec<Part>>, AppError> {
    Ok(Json(state.db.list_low_stock().await?))
}

pub async fn get_part(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
) -> Result<Json<Part>, AppError> {
    let part = state
        .db
        .get_part(part_id)
        .await?
        .ok_or_else(|| StockError::part_not_found(part_id))?;
    Ok(Json(part))
}

pub async fn get_part_by_business_id(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Result<Json<Part>, AppError> {
    let part = state
        .db
        .get_part_by_business_id(&business_id)
        .await?
        .ok_or_else(|| StockError::NotFound(format!("Part '{}'", business_id)))?;
    Ok(Json(part))
}

pub async fn update_part(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Json(input): Json<UpdatePartDetails>,
) -> Result<Json<Part>, AppError> {
    let part = state
        .db
        .update_part_details(part_id, &input)
        .await?
        .ok_or_else(|| StockError::part_not_found(part_id))?;
    Ok(Json(part))
}

/// Hard-deletes a part without history, archives one with history.
pub async fn remove_part(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.ledger.remove_part(part_id).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "part_id": part_id,
            "outcome": outcome,
        })),
    ))
}

use axum::{extract::State, Json};
use serde::Serialize;
use service_core::error::AppError;

use crate::models::{RecountLineResult, RecountRequest};
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct RecountReport {
    pub applied: usize,
    pub failed: usize,
    pub lines: Vec<RecountLineResult>,
}

/// Lines are applied independently; the report says which ones took.
pub async fn apply_recount(
    State(state): State<AppState>,
    Json(request): Json<RecountRequest>,
) -> Result<Json<RecountReport>, AppError> {
    let lines = state.ledger.apply_recount(request).await?;
    let applied = lines.iter().filter(|l| l.is_applied()).count();

    Ok(Json(RecountReport {
        applied,
        failed: lines.len() - applied,
        lines,
    }))
}

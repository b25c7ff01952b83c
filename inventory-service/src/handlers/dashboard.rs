use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::models::ResetMarker;
use crate::services::DashboardTotal;
use crate::startup::AppState;

/// Units issued in the current window. Degrades to the last known value when
/// the store is unreachable.
pub async fn monthly_total(State(state): State<AppState>) -> Result<Json<DashboardTotal>, AppError> {
    Ok(Json(state.ledger.monthly_total_or_cached().await?))
}

pub async fn reset_monthly_total(
    State(state): State<AppState>,
) -> Result<Json<ResetMarker>, AppError> {
    let marker = state.ledger.reset_monthly_counter().await?;
    tracing::info!(version = marker.version, "Monthly counter reset via API");
    Ok(Json(marker))
}

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::startup::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Gate privileged routes on the configured admin token. With no token
/// configured the routes are closed.
pub async fn require_admin_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin.token.as_deref() else {
        tracing::warn!("Privileged request refused: no admin token configured");
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Privileged actions are disabled"
        )));
    };

    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => {
            tracing::warn!("Failed admin authentication attempt");
            Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid or missing admin token"
            )))
        }
    }
}

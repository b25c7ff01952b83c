//! HTTP handlers for inventory-service.
//!
//! Thin JSON adapters over [`StockLedger`](crate::services::StockLedger) and
//! the read side of [`Database`](crate::services::Database).

pub mod admin;
pub mod dashboard;
pub mod movements;
pub mod parts;
pub mod recounts;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::startup::AppState;

/// Routes for the stock ledger API.
pub fn router(state: AppState) -> Router {
    let privileged = Router::new()
        .route(
            "/dashboard/monthly-total/reset",
            post(dashboard::reset_monthly_total),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin_token,
        ));

    Router::new()
        .route("/parts", post(parts::create_part).get(parts::list_parts))
        .route("/parts/low-stock", get(parts::list_low_stock))
        .route(
            "/parts/by-business-id/:business_id",
            get(parts::get_part_by_business_id),
        )
        .route(
            "/parts/:part_id",
            get(parts::get_part)
                .patch(parts::update_part)
                .delete(parts::remove_part),
        )
        .route(
            "/movements",
            post(movements::create_movement).get(movements::list_movements),
        )
        .route("/movements/bulk", post(movements::apply_bulk))
        .route(
            "/movements/:entry_id",
            get(movements::get_movement)
                .patch(movements::update_movement)
                .delete(movements::delete_movement),
        )
        .route("/recounts", post(recounts::apply_recount))
        .route("/dashboard/monthly-total", get(dashboard::monthly_total))
        .merge(privileged)
        .with_state(state)
}

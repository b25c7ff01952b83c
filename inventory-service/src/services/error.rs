use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::LineFailure;

#[derive(Error, Debug)]
pub enum StockError {
    #[error("Insufficient stock for part {part_id}: available {available}, requested {requested}")]
    InsufficientStock {
        part_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Part {0} is archived")]
    PartArchived(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bulk request rejected; every failing line is listed.
    #[error("Bulk movement rejected: {} line(s) failed", .0.len())]
    BulkRejected(Vec<LineFailure>),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StockError {
    pub fn part_not_found(part_id: Uuid) -> Self {
        StockError::NotFound(format!("Part {}", part_id))
    }

    pub fn entry_not_found(entry_id: Uuid) -> Self {
        StockError::NotFound(format!("Ledger entry {}", entry_id))
    }

    /// Label for the error counter.
    pub fn error_type(&self) -> &'static str {
        match self {
            StockError::InsufficientStock { .. } => "insufficient_stock",
            StockError::InvalidQuantity(_) => "invalid_quantity",
            StockError::NotFound(_) => "not_found",
            StockError::PartArchived(_) => "part_archived",
            StockError::Conflict(_) => "conflict",
            StockError::BulkRejected(_) => "bulk_rejected",
            StockError::Unavailable(_) => "unavailable",
            StockError::Database(_) => "db_error",
        }
    }
}

/// SQLSTATEs Postgres raises when `statement_timeout` or `lock_timeout` fires.
const QUERY_CANCELED: &str = "57014";
const LOCK_NOT_AVAILABLE: &str = "55P03";

fn is_timeout(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some(QUERY_CANCELED) | Some(LOCK_NOT_AVAILABLE)
        ),
        _ => false,
    }
}

/// Connection-level failures and server-side timeouts become `Unavailable`;
/// everything else stays a database error.
impl From<sqlx::Error> for StockError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StockError::Unavailable(err.to_string()),
            ref e if is_timeout(e) => StockError::Unavailable(err.to_string()),
            other => StockError::Database(other),
        }
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock {
                part_id,
                available,
                requested,
            } => AppError::Unprocessable {
                message: "Insufficient stock".to_string(),
                details: Some(serde_json::json!({
                    "part_id": part_id,
                    "available": available,
                    "requested": requested,
                })),
            },
            StockError::InvalidQuantity(msg) => AppError::Unprocessable {
                message: "Invalid quantity".to_string(),
                details: Some(serde_json::Value::String(msg)),
            },
            StockError::BulkRejected(failures) => AppError::Unprocessable {
                message: "Bulk movement rejected".to_string(),
                details: Some(serde_json::json!({ "failures": failures })),
            },
            StockError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            StockError::PartArchived(part_id) => {
                AppError::Conflict(anyhow::anyhow!("Part {} is archived", part_id))
            }
            StockError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            StockError::Unavailable(msg) => AppError::ServiceUnavailable(anyhow::anyhow!(msg)),
            StockError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}

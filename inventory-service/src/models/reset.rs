//! Reset marker and the monthly issued total it bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Singleton start-of-window override for the monthly counter.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResetMarker {
    pub reset_at_utc: DateTime<Utc>,
    /// Bumped on every reset.
    pub version: i64,
}

/// Units issued since `window_start` (exclusive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub total: i64,
    pub window_start: DateTime<Utc>,
    /// True when the window starts at a reset rather than the month boundary.
    pub from_reset: bool,
}

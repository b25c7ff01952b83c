//! Transient batch inputs and their per-line reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::{LedgerEntry, MovementMetadata};

/// One proposed charge-out within a bulk request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkLine {
    pub part_id: Uuid,
    pub quantity_delta: i32,
}

/// Ordered lines applied as one all-or-nothing unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkMovementRequest {
    pub lines: Vec<BulkLine>,
    #[serde(flatten)]
    pub metadata: MovementMetadata,
}

/// Why a line could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LineFailureReason {
    InsufficientStock { available: i32, requested: i32 },
    InvalidQuantity { requested: serde_json::Value },
    NotFound,
    PartArchived,
    /// The store failed while applying this line; other lines are unaffected.
    Unavailable { message: String },
}

impl LineFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::NotFound => "not_found",
            Self::PartArchived => "part_archived",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// A failed line, indexed by its position in the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub line: usize,
    pub part_id: Uuid,
    #[serde(flatten)]
    pub reason: LineFailureReason,
}

/// Result of a bulk request: everything applied, or nothing and every reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkOutcome {
    Applied { entries: Vec<LedgerEntry> },
    Rejected { failures: Vec<LineFailure> },
}

impl BulkOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Published once per committed bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkMovementApplied {
    pub lines_applied: usize,
    pub parts_affected: usize,
    pub timestamp: DateTime<Utc>,
}

/// A counted quantity as submitted. Anything that is not a JSON integer is
/// kept as-is so the line can fail on its own instead of failing the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountValue {
    Integer(i64),
    Other(serde_json::Value),
}

impl From<i64> for CountValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Observed shelf count for one part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecountLine {
    pub part_id: Uuid,
    pub absolute_quantity: CountValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecountRequest {
    pub lines: Vec<RecountLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecountOutcome {
    Applied { previous: i32, counted: i32 },
    Failed(LineFailureReason),
}

/// Per-line recount report. Lines are independent of each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecountLineResult {
    pub line: usize,
    pub part_id: Uuid,
    pub outcome: RecountOutcome,
}

impl RecountLineResult {
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, RecountOutcome::Applied { .. })
    }
}

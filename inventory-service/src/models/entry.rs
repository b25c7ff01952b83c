//! Ledger entry model: one issuance (charge-out) of stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::patch::double_option;

/// Why stock left the shelf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonCode {
    #[default]
    Maintenance,
    Replacement,
    Project,
    Other,
}

impl ReasonCode {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Replacement => "replacement",
            Self::Project => "project",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "maintenance" => Some(Self::Maintenance),
            "replacement" => Some(Self::Replacement),
            "project" => Some(Self::Project),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single issuance record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub part_id: Uuid,
    pub quantity_delta: i32,
    pub issued_at_utc: DateTime<Utc>,
    pub issued_to: String,
    pub reason_code: String,
    pub building_id: Option<Uuid>,
    pub cost_center_id: Option<Uuid>,
    pub issued_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LedgerEntry {
    /// Get parsed reason code.
    pub fn parsed_reason(&self) -> Option<ReasonCode> {
        ReasonCode::parse(&self.reason_code)
    }
}

/// Who/why/when of a movement. Shared by every line of a bulk request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementMetadata {
    /// Defaults to the time the engine records the movement.
    #[serde(default)]
    pub issued_at_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_to: String,
    #[serde(default)]
    pub reason_code: ReasonCode,
    #[serde(default)]
    pub building_id: Option<Uuid>,
    #[serde(default)]
    pub cost_center_id: Option<Uuid>,
    #[serde(default)]
    pub issued_by: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for a single charge-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMovement {
    pub part_id: Uuid,
    pub quantity_delta: i32,
    #[serde(flatten)]
    pub metadata: MovementMetadata,
}

/// Editable fields of an existing entry. The part reference is not here: it
/// is fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMovement {
    #[serde(default)]
    pub quantity_delta: Option<i32>,
    #[serde(default)]
    pub issued_at_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_to: Option<String>,
    #[serde(default)]
    pub reason_code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub building_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub cost_center_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub issued_by: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub notes: Option<Option<String>>,
}

impl UpdateMovement {
    /// Merge onto a stored entry, producing the row to write back.
    /// Stock math is not done here.
    pub fn apply_to(&self, entry: &LedgerEntry) -> LedgerEntry {
        let mut updated = entry.clone();
        if let Some(delta) = self.quantity_delta {
            updated.quantity_delta = delta;
        }
        if let Some(at) = self.issued_at_utc {
            updated.issued_at_utc = at;
        }
        if let Some(to) = &self.issued_to {
            updated.issued_to = to.clone();
        }
        if let Some(reason) = self.reason_code {
            updated.reason_code = reason.as_str().to_string();
        }
        if let Some(building) = self.building_id {
            updated.building_id = building;
        }
        if let Some(cost_center) = self.cost_center_id {
            updated.cost_center_id = cost_center;
        }
        if let Some(issued_by) = self.issued_by {
            updated.issued_by = issued_by;
        }
        if let Some(notes) = &self.notes {
            updated.notes = notes.clone();
        }
        updated
    }
}

/// Filters for listing entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub part_id: Option<Uuid>,
    #[serde(default)]
    pub issued_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page_size: Option<i32>,
}

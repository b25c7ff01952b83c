//! Part model: the owner of the on-hand quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::patch::double_option;

/// Lifecycle state of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    Active,
    Archived,
}

impl PartStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for PartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stocked part.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Part {
    pub part_id: Uuid,
    pub business_id: String,
    pub name: String,
    pub quantity: i32,
    pub reorder_level: Option<i32>,
    pub unit_cost: Option<Decimal>,
    pub location_id: Option<Uuid>,
    pub shelf_id: Option<Uuid>,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub archived_utc: Option<DateTime<Utc>>,
}

impl Part {
    /// Get parsed status. Unknown values are treated as archived so they
    /// never accept movements.
    pub fn parsed_status(&self) -> PartStatus {
        PartStatus::parse(&self.status).unwrap_or(PartStatus::Archived)
    }

    pub fn is_archived(&self) -> bool {
        self.parsed_status() == PartStatus::Archived
    }

    /// At or below its reorder level. Parts without a level never are.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_level
            .map(|level| self.quantity <= level)
            .unwrap_or(false)
    }
}

/// Input for part intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePart {
    pub business_id: String,
    pub name: String,
    #[serde(default)]
    pub initial_quantity: i32,
    #[serde(default)]
    pub reorder_level: Option<i32>,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub shelf_id: Option<Uuid>,
}

/// Descriptive fields of a part. Quantity is deliberately absent: it only
/// changes through movements and recounts.
///
/// Outer `None` leaves a field unchanged; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePartDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub reorder_level: Option<Option<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub unit_cost: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub location_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub shelf_id: Option<Option<Uuid>>,
}

/// What `remove_part` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartRemoval {
    /// No ledger history; the row is gone.
    Deleted,
    /// Referenced by ledger entries; kept as archived with zero stock.
    Archived,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(quantity: i32, reorder_level: Option<i32>, status: &str) -> Part {
        Part {
            part_id: Uuid::new_v4(),
            business_id: "FLT-0042".to_string(),
            name: "Air filter".to_string(),
            quantity,
            reorder_level,
            unit_cost: None,
            location_id: None,
            shelf_id: None,
            status: status.to_string(),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            archived_utc: None,
        }
    }

    #[test]
    fn reorder_only_with_level() {
        assert!(part(3, Some(3), "active").needs_reorder());
        assert!(!part(4, Some(3), "active").needs_reorder());
        assert!(!part(0, None, "active").needs_reorder());
    }

    #[test]
    fn status_column_text_round_trips() {
        for status in [PartStatus::Active, PartStatus::Archived] {
            assert_eq!(PartStatus::parse(status.as_str()), Some(status));
            assert_eq!(part(0, None, status.as_str()).parsed_status(), status);
        }
        assert_eq!(PartStatus::parse("Active"), None);
    }

    #[test]
    fn unknown_status_is_archived() {
        assert!(!part(1, None, "active").is_archived());
        assert!(part(1, None, "archived").is_archived());
        assert!(part(1, None, "retired").is_archived());
    }

    #[test]
    fn details_patch_distinguishes_clear_from_absent() {
        let patch: UpdatePartDetails =
            serde_json::from_str(r#"{"reorder_level": null, "name": "Oil filter"}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("Oil filter"));
        assert_eq!(patch.reorder_level, Some(None));
        assert_eq!(patch.unit_cost, None);
        assert_eq!(patch.location_id, None);
    }
}

//! Stock arithmetic and validation.
//!
//! Everything here is pure: callers load the rows (under lock) and write the
//! results back inside the same transaction. Keeping the math out of the SQL
//! lets the same rules serve single, bulk and recount paths.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use uuid::Uuid;

use super::error::StockError;
use crate::models::{BulkLine, CountValue, LineFailure, LineFailureReason, Part, ResetMarker};

/// A movement must remove at least one unit.
pub fn validate_delta(delta: i32) -> Result<(), StockError> {
    if delta <= 0 {
        return Err(StockError::InvalidQuantity(format!(
            "quantity_delta must be a positive integer, got {}",
            delta
        )));
    }
    Ok(())
}

/// Quantity left after issuing `delta` from `part`.
pub fn decrement(part: &Part, delta: i32) -> Result<i32, StockError> {
    validate_delta(delta)?;
    if part.is_archived() {
        return Err(StockError::PartArchived(part.part_id));
    }
    if part.quantity < delta {
        return Err(StockError::InsufficientStock {
            part_id: part.part_id,
            available: part.quantity,
            requested: delta,
        });
    }
    Ok(part.quantity - delta)
}

/// Quantity after an entry's delta changes from `old_delta` to `new_delta`.
///
/// Only the difference is applied. On failure `available` is what the entry
/// could grow to (current stock plus what it already holds).
pub fn readjust(part: &Part, old_delta: i32, new_delta: i32) -> Result<i32, StockError> {
    validate_delta(new_delta)?;
    if new_delta == old_delta {
        return Ok(part.quantity);
    }
    if new_delta > old_delta && part.is_archived() {
        return Err(StockError::PartArchived(part.part_id));
    }

    let diff = i64::from(new_delta) - i64::from(old_delta);
    let next = i64::from(part.quantity) - diff;
    if next < 0 {
        let available = i64::from(part.quantity) + i64::from(old_delta);
        return Err(StockError::InsufficientStock {
            part_id: part.part_id,
            available: clamp_i32(available),
            requested: new_delta,
        });
    }
    i32::try_from(next).map_err(|_| {
        StockError::InvalidQuantity(format!("resulting quantity {} is out of range", next))
    })
}

/// Quantity after an entry is removed and its delta returns to the shelf.
pub fn restore(part: &Part, delta: i32) -> Result<i32, StockError> {
    part.quantity.checked_add(delta).ok_or_else(|| {
        StockError::InvalidQuantity(format!(
            "restoring {} to part {} overflows its quantity",
            delta, part.part_id
        ))
    })
}

/// Validate an observed shelf count: a non-negative integer that fits a
/// part quantity.
pub fn validate_count(value: &CountValue) -> Result<i32, LineFailureReason> {
    let invalid = || LineFailureReason::InvalidQuantity {
        requested: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
    };
    match value {
        CountValue::Integer(n) if *n >= 0 => i32::try_from(*n).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Distinct part ids in first-appearance order.
pub fn distinct_part_ids(lines: &[BulkLine]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(lines.len());
    lines
        .iter()
        .filter(|line| seen.insert(line.part_id))
        .map(|line| line.part_id)
        .collect()
}

/// Line-shape checks that need no store access.
pub fn prevalidate_bulk(lines: &[BulkLine]) -> Result<(), StockError> {
    if lines.is_empty() {
        return Err(StockError::InvalidQuantity(
            "bulk request must contain at least one line".to_string(),
        ));
    }
    Ok(())
}

/// Final quantities per part for a bulk request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPlan {
    pub quantities: HashMap<Uuid, i32>,
}

/// Validate every line, in request order, against the locked parts.
///
/// Lines for the same part draw on a running balance, so two lines that each
/// fit but together exceed stock fail on the second. All failures are
/// collected; none short-circuits.
pub fn plan_bulk(lines: &[BulkLine], parts: &HashMap<Uuid, Part>) -> Result<BulkPlan, Vec<LineFailure>> {
    let mut running: HashMap<Uuid, i32> = HashMap::with_capacity(parts.len());
    let mut failures = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let fail = |reason| LineFailure {
            line: index,
            part_id: line.part_id,
            reason,
        };

        if line.quantity_delta <= 0 {
            failures.push(fail(LineFailureReason::InvalidQuantity {
                requested: line.quantity_delta.into(),
            }));
            continue;
        }

        let Some(part) = parts.get(&line.part_id) else {
            failures.push(fail(LineFailureReason::NotFound));
            continue;
        };

        if part.is_archived() {
            failures.push(fail(LineFailureReason::PartArchived));
            continue;
        }

        let available = running.entry(part.part_id).or_insert(part.quantity);
        if *available < line.quantity_delta {
            failures.push(fail(LineFailureReason::InsufficientStock {
                available: *available,
                requested: line.quantity_delta,
            }));
            continue;
        }
        *available -= line.quantity_delta;
    }

    if failures.is_empty() {
        Ok(BulkPlan { quantities: running })
    } else {
        Err(failures)
    }
}

/// First instant of the calendar month containing `now` (UTC).
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Lower (exclusive) bound of the monthly aggregate, and whether it came
/// from a reset marker.
pub fn window_start(marker: Option<&ResetMarker>, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    match marker {
        Some(marker) => (marker.reset_at_utc, true),
        None => (month_start(now), false),
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

//! Domain models for inventory-service.

mod batch;
mod entry;
mod part;
mod patch;
mod reset;

pub use batch::{
    BulkLine, BulkMovementApplied, BulkMovementRequest, BulkOutcome, CountValue, LineFailure,
    LineFailureReason, RecountLine, RecountLineResult, RecountOutcome, RecountRequest,
};
pub use entry::{
    CreateMovement, EntryFilter, LedgerEntry, MovementMetadata, ReasonCode, UpdateMovement,
};
pub use part::{CreatePart, Part, PartRemoval, PartStatus, UpdatePartDetails};
pub use reset::{MonthlyTotal, ResetMarker};

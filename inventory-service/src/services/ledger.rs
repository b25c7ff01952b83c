//! Stock ledger engine.
//!
//! Every write to `parts.quantity` after intake happens in this module, in
//! one of three transaction shapes:
//!
//! - single movement: create, update or delete one ledger entry and adjust
//!   the part by the matching amount;
//! - bulk movement: many creates, all or nothing;
//! - recount: overwrite quantity with an observed count, no ledger entry.
//!
//! Validation reads happen under `FOR UPDATE` in the same transaction as the
//! write, so concurrent callers serialize on the part row in Postgres.
//!
//! The operation timeout covers the work up to COMMIT, both client side and
//! as `statement_timeout`/`lock_timeout` inside the transaction. COMMIT itself
//! is never cut short: once it is sent, its result is what the caller gets.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgConnection;
use sqlx::{Postgres, Transaction};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    BulkMovementApplied, BulkMovementRequest, BulkOutcome, CreateMovement, LedgerEntry,
    LineFailureReason, MonthlyTotal, Part, PartRemoval, RecountLineResult, RecountOutcome,
    RecountRequest, ResetMarker, UpdateMovement,
};
use crate::services::database::{self, Database};
use crate::services::error::StockError;
use crate::services::metrics::{
    record_error, record_movement, BULK_LINES_TOTAL, BULK_REQUESTS_TOTAL, COUNTER_RESETS_TOTAL,
    NOTIFICATION_FAILURES_TOTAL, RECOUNT_LINES_TOTAL,
};
use crate::services::notifier::BulkMovementNotifier;
use crate::services::rules;

/// Monthly total as shown on the dashboard: live when the store answers,
/// otherwise the last good value (or zero) flagged as degraded.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DashboardTotal {
    pub total: i64,
    pub window_start: Option<chrono::DateTime<Utc>>,
    pub degraded: bool,
}

/// A transaction whose work is done, plus the value to return once it commits.
type Staged<T> = (Transaction<'static, Postgres>, T);

pub struct StockLedger {
    db: Arc<Database>,
    notifier: Arc<dyn BulkMovementNotifier>,
    operation_timeout: Duration,
    last_total: RwLock<Option<MonthlyTotal>>,
}

impl StockLedger {
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<dyn BulkMovementNotifier>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            db,
            notifier,
            operation_timeout,
            last_total: RwLock::new(None),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // -------------------------------------------------------------------------
    // Single Movement
    // -------------------------------------------------------------------------

    /// Record a charge-out and decrement the part.
    #[instrument(skip(self, input), fields(part_id = %input.part_id, quantity_delta = input.quantity_delta))]
    pub async fn create_movement(&self, input: CreateMovement) -> Result<LedgerEntry, StockError> {
        let result = self
            .committed("create_movement", self.create_movement_tx(&input))
            .await;
        observe_movement("create", &result);
        if let Ok(entry) = &result {
            info!(entry_id = %entry.entry_id, "Movement recorded");
        }
        result
    }

    async fn create_movement_tx(
        &self,
        input: &CreateMovement,
    ) -> Result<Staged<LedgerEntry>, StockError> {
        rules::validate_delta(input.quantity_delta)?;

        let mut tx = self.begin().await?;

        let part = database::lock_part(&mut tx, input.part_id)
            .await?
            .ok_or_else(|| StockError::part_not_found(input.part_id))?;
        let remaining = rules::decrement(&part, input.quantity_delta)?;

        let issued_at = input.metadata.issued_at_utc.unwrap_or_else(Utc::now);
        let entry = database::insert_entry(
            &mut tx,
            part.part_id,
            input.quantity_delta,
            issued_at,
            &input.metadata,
        )
        .await?;
        database::write_quantity(&mut tx, part.part_id, remaining).await?;

        debug!(entry_id = %entry.entry_id, remaining = remaining, "Movement staged");

        Ok((tx, entry))
    }

    /// Edit an entry. A changed delta moves stock by the difference only.
    #[instrument(skip(self, patch), fields(entry_id = %entry_id))]
    pub async fn update_movement(
        &self,
        entry_id: Uuid,
        patch: UpdateMovement,
    ) -> Result<LedgerEntry, StockError> {
        let result = self
            .committed("update_movement", self.update_movement_tx(entry_id, &patch))
            .await;
        observe_movement("update", &result);
        result
    }

    async fn update_movement_tx(
        &self,
        entry_id: Uuid,
        patch: &UpdateMovement,
    ) -> Result<Staged<LedgerEntry>, StockError> {
        if let Some(delta) = patch.quantity_delta {
            rules::validate_delta(delta)?;
        }

        let mut tx = self.begin().await?;

        let entry = database::lock_entry(&mut tx, entry_id)
            .await?
            .ok_or_else(|| StockError::entry_not_found(entry_id))?;
        let updated = patch.apply_to(&entry);

        if updated.quantity_delta != entry.quantity_delta {
            let part = database::lock_part(&mut tx, entry.part_id)
                .await?
                .ok_or_else(|| StockError::part_not_found(entry.part_id))?;
            let next = rules::readjust(&part, entry.quantity_delta, updated.quantity_delta)?;
            database::write_quantity(&mut tx, part.part_id, next).await?;

            debug!(
                part_id = %part.part_id,
                old_delta = entry.quantity_delta,
                new_delta = updated.quantity_delta,
                remaining = next,
                "Movement quantity adjusted"
            );
        }

        let saved = database::rewrite_entry(&mut tx, &updated).await?;

        Ok((tx, saved))
    }

    /// Remove an entry and put its quantity back on the shelf.
    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn delete_movement(&self, entry_id: Uuid) -> Result<(), StockError> {
        let result = self
            .committed("delete_movement", self.delete_movement_tx(entry_id))
            .await;
        observe_movement("delete", &result);
        if result.is_ok() {
            info!("Movement deleted");
        }
        result
    }

    async fn delete_movement_tx(&self, entry_id: Uuid) -> Result<Staged<()>, StockError> {
        let mut tx = self.begin().await?;

        let entry = database::lock_entry(&mut tx, entry_id)
            .await?
            .ok_or_else(|| StockError::entry_not_found(entry_id))?;
        let part = database::lock_part(&mut tx, entry.part_id)
            .await?
            .ok_or_else(|| StockError::part_not_found(entry.part_id))?;
        let restored = rules::restore(&part, entry.quantity_delta)?;

        if !database::delete_entry_row(&mut tx, entry_id).await? {
            return Err(StockError::entry_not_found(entry_id));
        }
        database::write_quantity(&mut tx, part.part_id, restored).await?;

        debug!(
            part_id = %part.part_id,
            restored = entry.quantity_delta,
            remaining = restored,
            "Movement removal staged"
        );

        Ok((tx, ()))
    }

    // -------------------------------------------------------------------------
    // Bulk Movement
    // -------------------------------------------------------------------------

    /// Apply every line or none. On rejection every failing line is reported.
    #[instrument(skip(self, request), fields(line_count = request.lines.len()))]
    pub async fn apply_bulk(&self, request: BulkMovementRequest) -> Result<BulkOutcome, StockError> {
        let result = match rules::prevalidate_bulk(&request.lines) {
            Ok(()) => self.committed("apply_bulk", self.apply_bulk_tx(&request)).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(BulkOutcome::Applied { entries }) => {
                info!(lines_applied = entries.len(), "Bulk movement committed");
                BULK_REQUESTS_TOTAL.with_label_values(&["applied"]).inc();
                BULK_LINES_TOTAL
                    .with_label_values(&["applied"])
                    .inc_by(entries.len() as f64);

                let event = BulkMovementApplied {
                    lines_applied: entries.len(),
                    parts_affected: rules::distinct_part_ids(&request.lines).len(),
                    timestamp: Utc::now(),
                };
                self.publish(&event).await;
            }
            Ok(BulkOutcome::Rejected { failures }) => {
                BULK_REQUESTS_TOTAL.with_label_values(&["rejected"]).inc();
                for failure in failures {
                    BULK_LINES_TOTAL
                        .with_label_values(&[failure.reason.as_str()])
                        .inc();
                }
                warn!(failed_lines = failures.len(), "Bulk movement rejected");
            }
            Err(e) => {
                BULK_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
                record_error(e.error_type());
            }
        }

        result
    }

    async fn apply_bulk_tx(
        &self,
        request: &BulkMovementRequest,
    ) -> Result<Staged<BulkOutcome>, StockError> {
        let part_ids = rules::distinct_part_ids(&request.lines);

        let mut tx = self.begin().await?;

        let parts: HashMap<Uuid, Part> = database::lock_parts_ordered(&mut tx, &part_ids)
            .await?
            .into_iter()
            .map(|part| (part.part_id, part))
            .collect();

        let plan = match rules::plan_bulk(&request.lines, &parts) {
            Ok(plan) => plan,
            // Nothing was written; committing only releases the locks.
            Err(failures) => return Ok((tx, BulkOutcome::Rejected { failures })),
        };

        let issued_at = request.metadata.issued_at_utc.unwrap_or_else(Utc::now);
        let mut entries = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let entry = database::insert_entry(
                &mut tx,
                line.part_id,
                line.quantity_delta,
                issued_at,
                &request.metadata,
            )
            .await?;
            entries.push(entry);
        }

        for part_id in &part_ids {
            if let Some(quantity) = plan.quantities.get(part_id) {
                database::write_quantity(&mut tx, *part_id, *quantity).await?;
            }
        }

        debug!(
            lines_applied = entries.len(),
            parts_affected = part_ids.len(),
            "Bulk movement staged"
        );

        Ok((tx, BulkOutcome::Applied { entries }))
    }

    async fn publish(&self, event: &BulkMovementApplied) {
        if let Err(e) = self.notifier.bulk_applied(event).await {
            warn!(
                error = %e,
                notifier = self.notifier.name(),
                "Failed to publish bulk completion event"
            );
            NOTIFICATION_FAILURES_TOTAL
                .with_label_values(&[self.notifier.name()])
                .inc();
        }
    }

    // -------------------------------------------------------------------------
    // Recount
    // -------------------------------------------------------------------------

    /// Overwrite quantities with observed counts. Each line commits on its
    /// own; a failed line does not stop the rest.
    #[instrument(skip(self, request), fields(line_count = request.lines.len()))]
    pub async fn apply_recount(
        &self,
        request: RecountRequest,
    ) -> Result<Vec<RecountLineResult>, StockError> {
        if request.lines.is_empty() {
            return Err(StockError::InvalidQuantity(
                "recount must contain at least one line".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(request.lines.len());

        for (index, line) in request.lines.iter().enumerate() {
            let outcome = match rules::validate_count(&line.absolute_quantity) {
                Err(reason) => RecountOutcome::Failed(reason),
                Ok(counted) => match self
                    .committed("recount_line", self.recount_line_tx(line.part_id, counted))
                    .await
                {
                    Ok(previous) => RecountOutcome::Applied { previous, counted },
                    Err(e) => RecountOutcome::Failed(recount_failure(e)),
                },
            };

            let status = match &outcome {
                RecountOutcome::Applied { .. } => "applied",
                RecountOutcome::Failed(reason) => reason.as_str(),
            };
            RECOUNT_LINES_TOTAL.with_label_values(&[status]).inc();

            results.push(RecountLineResult {
                line: index,
                part_id: line.part_id,
                outcome,
            });
        }

        let applied = results.iter().filter(|r| r.is_applied()).count();
        info!(
            applied = applied,
            failed = results.len() - applied,
            "Recount processed"
        );

        Ok(results)
    }

    async fn recount_line_tx(&self, part_id: Uuid, counted: i32) -> Result<Staged<i32>, StockError> {
        let mut tx = self.begin().await?;

        let part = database::lock_part(&mut tx, part_id)
            .await?
            .ok_or_else(|| StockError::part_not_found(part_id))?;
        if part.is_archived() {
            return Err(StockError::PartArchived(part_id));
        }
        let previous = overwrite_count(&mut tx, &part, counted).await?;

        Ok((tx, previous))
    }

    // -------------------------------------------------------------------------
    // Part Removal
    // -------------------------------------------------------------------------

    /// Delete a part with no history; archive (zero stock, archived status)
    /// one that ledger entries still reference.
    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn remove_part(&self, part_id: Uuid) -> Result<PartRemoval, StockError> {
        let result = self
            .committed("remove_part", self.remove_part_tx(part_id))
            .await;
        match &result {
            Ok(PartRemoval::Deleted) => info!("Part deleted"),
            Ok(PartRemoval::Archived) => info!("Part archived"),
            Err(e) => record_error(e.error_type()),
        }
        result
    }

    async fn remove_part_tx(&self, part_id: Uuid) -> Result<Staged<PartRemoval>, StockError> {
        let mut tx = self.begin().await?;

        let part = database::lock_part(&mut tx, part_id)
            .await?
            .ok_or_else(|| StockError::part_not_found(part_id))?;

        if !database::has_entries(&mut tx, part_id).await? {
            database::delete_part_row(&mut tx, part_id).await?;
            return Ok((tx, PartRemoval::Deleted));
        }

        if !part.is_archived() {
            overwrite_count(&mut tx, &part, 0).await?;
            database::mark_archived(&mut tx, part_id).await?;
        }

        Ok((tx, PartRemoval::Archived))
    }

    // -------------------------------------------------------------------------
    // Monthly Aggregate
    // -------------------------------------------------------------------------

    /// Units issued since the current window start.
    #[instrument(skip(self))]
    pub async fn monthly_total(&self) -> Result<MonthlyTotal, StockError> {
        let result = self.committed("monthly_total", self.monthly_total_tx()).await;

        match &result {
            Ok(total) => {
                *self.last_total.write().await = Some(total.clone());
            }
            Err(e) => {
                record_error(e.error_type());
            }
        }

        result
    }

    async fn monthly_total_tx(&self) -> Result<Staged<MonthlyTotal>, StockError> {
        let mut tx = self.db.begin_snapshot().await?;
        database::set_local_timeouts(&mut tx, self.operation_timeout).await?;

        let marker = database::read_reset_marker(&mut tx).await?;
        let (window_start, from_reset) = rules::window_start(marker.as_ref(), Utc::now());
        let total = database::sum_issued_after(&mut tx, window_start).await?;

        let total = MonthlyTotal {
            total: total.max(0),
            window_start,
            from_reset,
        };

        Ok((tx, total))
    }

    /// Dashboard read: never fails on an unavailable store, falls back to the
    /// last good total (or zero) instead.
    pub async fn monthly_total_or_cached(&self) -> Result<DashboardTotal, StockError> {
        match self.monthly_total().await {
            Ok(total) => Ok(DashboardTotal {
                total: total.total,
                window_start: Some(total.window_start),
                degraded: false,
            }),
            Err(StockError::Unavailable(reason)) => {
                warn!(reason = %reason, "Monthly total unavailable, serving cached value");
                let cached = self.last_total.read().await.clone();
                Ok(DashboardTotal {
                    total: cached.as_ref().map(|t| t.total).unwrap_or(0),
                    window_start: cached.map(|t| t.window_start),
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Start a new counting window now. Ledger rows are left untouched.
    #[instrument(skip(self))]
    pub async fn reset_monthly_counter(&self) -> Result<ResetMarker, StockError> {
        let result = self
            .committed("reset_monthly_counter", self.reset_tx())
            .await;

        match &result {
            Ok(marker) => {
                COUNTER_RESETS_TOTAL.with_label_values(&["ok"]).inc();
                *self.last_total.write().await = Some(MonthlyTotal {
                    total: 0,
                    window_start: marker.reset_at_utc,
                    from_reset: true,
                });
            }
            Err(e) => {
                COUNTER_RESETS_TOTAL.with_label_values(&["error"]).inc();
                record_error(e.error_type());
            }
        }

        result
    }

    async fn reset_tx(&self) -> Result<Staged<ResetMarker>, StockError> {
        let mut tx = self.begin().await?;
        let marker = database::write_reset_marker(&mut tx, Utc::now()).await?;
        Ok((tx, marker))
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Read-write transaction with the operation timeout set server side.
    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StockError> {
        let mut tx = self.db.begin().await?;
        database::set_local_timeouts(&mut tx, self.operation_timeout).await?;
        Ok(tx)
    }

    /// Run the transaction work under the timeout, then commit outside it.
    async fn committed<T, F>(&self, operation: &'static str, work: F) -> Result<T, StockError>
    where
        F: Future<Output = Result<Staged<T>, StockError>>,
    {
        let (tx, value) = self.bounded(operation, work).await?;
        tx.commit().await?;
        Ok(value)
    }

    /// Run `fut` under the operation timeout. On expiry the future, and the
    /// uncommitted transaction it owns, is dropped; sqlx rolls it back.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StockError>
    where
        F: Future<Output = Result<T, StockError>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Ledger operation timed out; transaction rolled back"
                );
                Err(StockError::Unavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.operation_timeout
                )))
            }
        }
    }
}

/// The recount write. Shared by recount lines and archival so both reach
/// `parts.quantity` through the same path. Returns the previous quantity.
async fn overwrite_count(
    conn: &mut PgConnection,
    part: &Part,
    counted: i32,
) -> Result<i32, StockError> {
    database::write_quantity(conn, part.part_id, counted).await?;
    info!(
        part_id = %part.part_id,
        previous = part.quantity,
        counted = counted,
        "Quantity recounted"
    );
    Ok(part.quantity)
}

fn observe_movement<T>(operation: &str, result: &Result<T, StockError>) {
    record_movement(operation, result.is_ok());
    if let Err(e) = result {
        record_error(e.error_type());
    }
}

fn recount_failure(err: StockError) -> LineFailureReason {
    match err {
        StockError::NotFound(_) => LineFailureReason::NotFound,
        StockError::PartArchived(_) => LineFailureReason::PartArchived,
        other => LineFailureReason::Unavailable {
            message: other.to_string(),
        },
    }
}

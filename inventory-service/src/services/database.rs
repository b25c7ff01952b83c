//! Database service for inventory-service.
//!
//! Pool-level reads live on [`Database`]. Statements that must run inside an
//! engine transaction are free functions taking `&mut PgConnection`; the
//! quantity writers among them are crate-private so that only the ledger
//! engine can change `parts.quantity`.

use crate::models::{
    CreatePart, EntryFilter, LedgerEntry, MovementMetadata, Part, PartStatus, ResetMarker,
    UpdatePartDetails,
};
use crate::services::error::StockError;
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "inventory-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StockError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| StockError::Unavailable(format!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), StockError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), StockError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::migrate::MigrateError::Execute(err) => StockError::from(err),
                other => StockError::Unavailable(format!("Migration failed: {}", other)),
            })?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Open a read-write transaction.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, StockError> {
        Ok(self.pool.begin().await?)
    }

    /// Open a transaction that sees one snapshot for all its reads.
    pub async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, StockError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    // -------------------------------------------------------------------------
    // Part Operations
    // -------------------------------------------------------------------------

    /// Intake a new part with its opening quantity.
    #[instrument(skip(self, input), fields(business_id = %input.business_id))]
    pub async fn create_part(&self, input: &CreatePart) -> Result<Part, StockError> {
        if input.business_id.trim().is_empty() {
            return Err(StockError::InvalidQuantity(
                "business_id must not be empty".to_string(),
            ));
        }
        if input.initial_quantity < 0 {
            return Err(StockError::InvalidQuantity(format!(
                "initial_quantity must be non-negative, got {}",
                input.initial_quantity
            )));
        }
        if matches!(input.reorder_level, Some(level) if level < 0) {
            return Err(StockError::InvalidQuantity(
                "reorder_level must be non-negative".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_part"])
            .start_timer();

        let part_id = Uuid::new_v4();
        let part = sqlx::query_as::<_, Part>(
            r#"
            INSERT INTO parts (part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
            "#,
        )
        .bind(part_id)
        .bind(input.business_id.trim())
        .bind(&input.name)
        .bind(input.initial_quantity)
        .bind(input.reorder_level)
        .bind(input.unit_cost)
        .bind(input.location_id)
        .bind(input.shelf_id)
        .bind(PartStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StockError::Conflict(format!(
                    "Part with business id '{}' already exists",
                    input.business_id
                ))
            }
            other => StockError::from(other),
        })?;

        timer.observe_duration();

        info!(
            part_id = %part.part_id,
            quantity = part.quantity,
            "Part created"
        );

        Ok(part)
    }

    /// Get a part by ID.
    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn get_part(&self, part_id: Uuid) -> Result<Option<Part>, StockError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_part"])
            .start_timer();

        let part = sqlx::query_as::<_, Part>(
            r#"
            SELECT part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
            FROM parts
            WHERE part_id = $1
            "#,
        )
        .bind(part_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(part)
    }

    /// Get a part by its human-facing code.
    #[instrument(skip(self))]
    pub async fn get_part_by_business_id(
        &self,
        business_id: &str,
    ) -> Result<Option<Part>, StockError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_part_by_business_id"])
            .start_timer();

        let part = sqlx::query_as::<_, Part>(
            r#"
            SELECT part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
            FROM parts
            WHERE business_id = $1
            "#,
        )
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(part)
    }

    /// List parts ordered by business id, keyset-paginated on it.
    #[instrument(skip(self))]
    pub async fn list_parts(
        &self,
        include_archived: bool,
        page_size: i32,
        page_token: Option<&str>,
    ) -> Result<Vec<Part>, StockError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_parts"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let parts = sqlx::query_as::<_, Part>(
            r#"
            SELECT part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
            FROM parts
            WHERE ($1 OR status = 'active')
              AND ($2::varchar IS NULL OR business_id > $2)
            ORDER BY business_id
            LIMIT $3
            "#,
        )
        .bind(include_archived)
        .bind(page_token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(parts)
    }

    /// Active parts at or below their reorder level.
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<Part>, StockError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_low_stock"])
            .start_timer();

        let parts = sqlx::query_as::<_, Part>(
            r#"
            SELECT part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
            FROM parts
            WHERE status = 'active'
              AND reorder_level IS NOT NULL
              AND quantity <= reorder_level
            ORDER BY quantity - reorder_level, business_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(parts)
    }

    /// Edit descriptive fields. Never touches quantity or status.
    #[instrument(skip(self, input), fields(part_id = %part_id))]
    pub async fn update_part_details(
        &self,
        part_id: Uuid,
        input: &UpdatePartDetails,
    ) -> Result<Option<Part>, StockError> {
        if matches!(input.reorder_level, Some(Some(level)) if level < 0) {
            return Err(StockError::InvalidQuantity(
                "reorder_level must be non-negative".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_part_details"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let Some(current) = lock_part(&mut tx, part_id).await? else {
            return Ok(None);
        };

        let part = sqlx::query_as::<_, Part>(
            r#"
            UPDATE parts
            SET name = $2, reorder_level = $3, unit_cost = $4, location_id = $5, shelf_id = $6, updated_utc = NOW()
            WHERE part_id = $1
            RETURNING part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
            "#,
        )
        .bind(part_id)
        .bind(input.name.as_ref().unwrap_or(&current.name))
        .bind(input.reorder_level.unwrap_or(current.reorder_level))
        .bind(input.unit_cost.unwrap_or(current.unit_cost))
        .bind(input.location_id.unwrap_or(current.location_id))
        .bind(input.shelf_id.unwrap_or(current.shelf_id))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        timer.observe_duration();

        info!(part_id = %part.part_id, "Part details updated");

        Ok(Some(part))
    }

    // -------------------------------------------------------------------------
    // Ledger Entry Operations
    // -------------------------------------------------------------------------

    /// Get a ledger entry by ID.
    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn get_entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>, StockError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_entry"])
            .start_timer();

        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, part_id, quantity_delta, issued_at_utc, issued_to, reason_code, building_id, cost_center_id, issued_by, notes, created_utc, updated_utc
            FROM ledger_entries
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(entry)
    }

    /// List entries, most recently issued first.
    #[instrument(skip(self, filter))]
    pub async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StockError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_entries"])
            .start_timer();

        let limit = filter.page_size.unwrap_or(50).clamp(1, 500) as i64;

        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, part_id, quantity_delta, issued_at_utc, issued_to, reason_code, building_id, cost_center_id, issued_by, notes, created_utc, updated_utc
            FROM ledger_entries
            WHERE ($1::uuid IS NULL OR part_id = $1)
              AND ($2::timestamptz IS NULL OR issued_at_utc >= $2)
              AND ($3::timestamptz IS NULL OR issued_at_utc <= $3)
            ORDER BY issued_at_utc DESC, entry_id DESC
            LIMIT $4
            "#,
        )
        .bind(filter.part_id)
        .bind(filter.issued_from)
        .bind(filter.issued_until)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(entries)
    }

    /// Total number of ledger entries.
    #[instrument(skip(self))]
    pub async fn count_entries(&self) -> Result<i64, StockError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Reset Marker Operations
    // -------------------------------------------------------------------------

    /// Current reset marker, read outside any engine transaction.
    #[instrument(skip(self))]
    pub async fn get_reset_marker(&self) -> Result<Option<ResetMarker>, StockError> {
        let mut conn = self.pool.acquire().await?;
        read_reset_marker(&mut conn).await
    }

    /// Move the window start of the monthly counter to `reset_at`. Ledger
    /// rows are not touched.
    #[instrument(skip(self))]
    pub async fn upsert_reset_marker(
        &self,
        reset_at: DateTime<Utc>,
    ) -> Result<ResetMarker, StockError> {
        let mut conn = self.pool.acquire().await?;
        write_reset_marker(&mut conn, reset_at).await
    }
}

// -----------------------------------------------------------------------------
// Transaction-scoped statements
// -----------------------------------------------------------------------------

/// Bound every statement and lock wait in the current transaction, so
/// Postgres aborts a stuck transaction on its own.
pub(crate) async fn set_local_timeouts(
    conn: &mut PgConnection,
    timeout: Duration,
) -> Result<(), StockError> {
    let millis = timeout.as_millis().max(1).to_string();
    sqlx::query(
        "SELECT set_config('statement_timeout', $1, true), set_config('lock_timeout', $1, true)",
    )
    .bind(millis)
    .execute(conn)
    .await?;
    Ok(())
}

/// Upsert the singleton reset marker, bumping its version.
pub(crate) async fn write_reset_marker(
    conn: &mut PgConnection,
    reset_at: DateTime<Utc>,
) -> Result<ResetMarker, StockError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["upsert_reset_marker"])
        .start_timer();

    let marker = sqlx::query_as::<_, ResetMarker>(
        r#"
        INSERT INTO reset_markers (marker_id, reset_at_utc, version)
        VALUES (1, $1, 1)
        ON CONFLICT (marker_id)
        DO UPDATE SET reset_at_utc = EXCLUDED.reset_at_utc, version = reset_markers.version + 1
        RETURNING reset_at_utc, version
        "#,
    )
    .bind(reset_at)
    .fetch_one(conn)
    .await?;

    timer.observe_duration();

    info!(
        reset_at = %marker.reset_at_utc,
        version = marker.version,
        "Monthly counter reset"
    );

    Ok(marker)
}

/// Lock a part row for the rest of the transaction.
pub(crate) async fn lock_part(
    conn: &mut PgConnection,
    part_id: Uuid,
) -> Result<Option<Part>, StockError> {
    let part = sqlx::query_as::<_, Part>(
        r#"
        SELECT part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
        FROM parts
        WHERE part_id = $1
        FOR UPDATE
        "#,
    )
    .bind(part_id)
    .fetch_optional(conn)
    .await?;
    Ok(part)
}

/// Lock several parts in ascending business id order. Every multi-part
/// writer goes through here so concurrent batches acquire rows in one global
/// order. Missing ids are simply absent from the result.
pub(crate) async fn lock_parts_ordered(
    conn: &mut PgConnection,
    part_ids: &[Uuid],
) -> Result<Vec<Part>, StockError> {
    let parts = sqlx::query_as::<_, Part>(
        r#"
        SELECT part_id, business_id, name, quantity, reorder_level, unit_cost, location_id, shelf_id, status, created_utc, updated_utc, archived_utc
        FROM parts
        WHERE part_id = ANY($1)
        ORDER BY business_id
        FOR UPDATE
        "#,
    )
    .bind(part_ids)
    .fetch_all(conn)
    .await?;
    Ok(parts)
}

/// Overwrite a part's on-hand quantity. Only the ledger engine calls this.
pub(crate) async fn write_quantity(
    conn: &mut PgConnection,
    part_id: Uuid,
    quantity: i32,
) -> Result<(), StockError> {
    sqlx::query("UPDATE parts SET quantity = $2, updated_utc = NOW() WHERE part_id = $1")
        .bind(part_id)
        .bind(quantity)
        .execute(conn)
        .await?;
    Ok(())
}

/// Flag a part archived. Quantity is zeroed separately through the recount path.
pub(crate) async fn mark_archived(conn: &mut PgConnection, part_id: Uuid) -> Result<(), StockError> {
    sqlx::query(
        r#"
        UPDATE parts
        SET status = $2, archived_utc = NOW(), updated_utc = NOW()
        WHERE part_id = $1
        "#,
    )
    .bind(part_id)
    .bind(PartStatus::Archived.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

/// Hard-delete a part row. Fails with a foreign-key error if entries exist.
pub(crate) async fn delete_part_row(
    conn: &mut PgConnection,
    part_id: Uuid,
) -> Result<bool, StockError> {
    let result = sqlx::query("DELETE FROM parts WHERE part_id = $1")
        .bind(part_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn has_entries(conn: &mut PgConnection, part_id: Uuid) -> Result<bool, StockError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM ledger_entries WHERE part_id = $1)")
            .bind(part_id)
            .fetch_one(conn)
            .await?;
    Ok(exists)
}

/// Lock a ledger entry row for the rest of the transaction.
pub(crate) async fn lock_entry(
    conn: &mut PgConnection,
    entry_id: Uuid,
) -> Result<Option<LedgerEntry>, StockError> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT entry_id, part_id, quantity_delta, issued_at_utc, issued_to, reason_code, building_id, cost_center_id, issued_by, notes, created_utc, updated_utc
        FROM ledger_entries
        WHERE entry_id = $1
        FOR UPDATE
        "#,
    )
    .bind(entry_id)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub(crate) async fn insert_entry(
    conn: &mut PgConnection,
    part_id: Uuid,
    quantity_delta: i32,
    issued_at: DateTime<Utc>,
    metadata: &MovementMetadata,
) -> Result<LedgerEntry, StockError> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (entry_id, part_id, quantity_delta, issued_at_utc, issued_to, reason_code, building_id, cost_center_id, issued_by, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING entry_id, part_id, quantity_delta, issued_at_utc, issued_to, reason_code, building_id, cost_center_id, issued_by, notes, created_utc, updated_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(part_id)
    .bind(quantity_delta)
    .bind(issued_at)
    .bind(&metadata.issued_to)
    .bind(metadata.reason_code.as_str())
    .bind(metadata.building_id)
    .bind(metadata.cost_center_id)
    .bind(metadata.issued_by)
    .bind(&metadata.notes)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

/// Write back every mutable column of an entry. `part_id` is not in the SET list.
pub(crate) async fn rewrite_entry(
    conn: &mut PgConnection,
    entry: &LedgerEntry,
) -> Result<LedgerEntry, StockError> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        UPDATE ledger_entries
        SET quantity_delta = $2, issued_at_utc = $3, issued_to = $4, reason_code = $5,
            building_id = $6, cost_center_id = $7, issued_by = $8, notes = $9, updated_utc = NOW()
        WHERE entry_id = $1
        RETURNING entry_id, part_id, quantity_delta, issued_at_utc, issued_to, reason_code, building_id, cost_center_id, issued_by, notes, created_utc, updated_utc
        "#,
    )
    .bind(entry.entry_id)
    .bind(entry.quantity_delta)
    .bind(entry.issued_at_utc)
    .bind(&entry.issued_to)
    .bind(&entry.reason_code)
    .bind(entry.building_id)
    .bind(entry.cost_center_id)
    .bind(entry.issued_by)
    .bind(&entry.notes)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub(crate) async fn delete_entry_row(
    conn: &mut PgConnection,
    entry_id: Uuid,
) -> Result<bool, StockError> {
    let result = sqlx::query("DELETE FROM ledger_entries WHERE entry_id = $1")
        .bind(entry_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn read_reset_marker(
    conn: &mut PgConnection,
) -> Result<Option<ResetMarker>, StockError> {
    let marker = sqlx::query_as::<_, ResetMarker>(
        "SELECT reset_at_utc, version FROM reset_markers WHERE marker_id = 1",
    )
    .fetch_optional(conn)
    .await?;
    Ok(marker)
}

/// Sum of deltas issued strictly after `window_start`.
pub(crate) async fn sum_issued_after(
    conn: &mut PgConnection,
    window_start: DateTime<Utc>,
) -> Result<i64, StockError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(quantity_delta), 0)::BIGINT
        FROM ledger_entries
        WHERE issued_at_utc > $1
        "#,
    )
    .bind(window_start)
    .fetch_one(conn)
    .await?;
    Ok(total)
}

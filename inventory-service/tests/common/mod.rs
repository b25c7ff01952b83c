//! Common test utilities for inventory-service integration tests.
//!
//! Every test gets its own Postgres schema (`search_path` pinned on each pooled
//! connection), so tests can run in parallel against one database.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Once};
use std::time::Duration;

use chrono::{DateTime, Utc};
use inventory_service::config::{AdminConfig, DatabaseConfig, InventoryConfig, LedgerConfig};
use inventory_service::models::{
    BulkLine, BulkMovementApplied, BulkMovementRequest, CreateMovement, CreatePart,
    MovementMetadata, Part, ReasonCode,
};
use inventory_service::services::{ChannelNotifier, Database, StockLedger};
use inventory_service::startup::Application;
use service_core::config::Config as CommonConfig;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::sync::broadcast;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,inventory_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests")
}

/// Isolated, migrated schema plus an engine over it.
pub struct TestLedger {
    pub db: Database,
    pub ledger: Arc<StockLedger>,
    pub events: ChannelNotifier,
    schema: String,
    admin_pool: PgPool,
}

/// Create a fresh schema and run migrations into it.
pub async fn isolated_database(max_connections: u32) -> (Database, String, PgPool) {
    init_tracing();

    let url = database_url();
    let schema = format!("inv_test_{}", Uuid::new_v4().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test schema");

    let options = PgConnectOptions::from_str(&url)
        .expect("Invalid TEST_DATABASE_URL")
        .options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .expect("Failed to connect test pool");

    let db = Database::from_pool(pool);
    db.run_migrations().await.expect("Failed to run migrations");

    (db, schema, admin_pool)
}

async fn drop_schema(admin_pool: &PgPool, schema: &str) {
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
        .execute(admin_pool)
        .await
        .ok();
}

/// Engine over an isolated schema with the given operation timeout.
pub async fn spawn_ledger_with_timeout(operation_timeout: Duration) -> TestLedger {
    let (db, schema, admin_pool) = isolated_database(10).await;
    let events = ChannelNotifier::new(16);
    let ledger = Arc::new(StockLedger::new(
        Arc::new(db.clone()),
        Arc::new(events.clone()),
        operation_timeout,
    ));

    TestLedger {
        db,
        ledger,
        events,
        schema,
        admin_pool,
    }
}

pub async fn spawn_ledger() -> TestLedger {
    spawn_ledger_with_timeout(Duration::from_secs(5)).await
}

impl TestLedger {
    pub fn subscribe(&self) -> broadcast::Receiver<BulkMovementApplied> {
        self.events.subscribe()
    }

    pub async fn create_part(&self, business_id: &str, quantity: i32) -> Part {
        create_part(&self.db, business_id, quantity).await
    }

    pub async fn quantity(&self, part_id: Uuid) -> i32 {
        self.db
            .get_part(part_id)
            .await
            .expect("Failed to read part")
            .expect("Part should exist")
            .quantity
    }

    pub async fn entry_count(&self) -> i64 {
        self.db.count_entries().await.expect("Failed to count entries")
    }

    pub async fn cleanup(self) {
        self.db.pool().close().await;
        drop_schema(&self.admin_pool, &self.schema).await;
    }
}

/// Running HTTP application over an isolated schema.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub db: Database,
    schema: String,
    admin_pool: PgPool,
}

pub async fn spawn_app() -> TestApp {
    let (db, schema, admin_pool) = isolated_database(5).await;

    let config = InventoryConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "inventory-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            // Unused: the pool is handed in already connected.
            url: database_url(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
        },
        ledger: LedgerConfig::default(),
        admin: AdminConfig {
            token: Some(ADMIN_TOKEN.to_string()),
        },
    };

    let app = Application::build_with_database(config, db.clone())
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", app.http_port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = reqwest::Client::new();

    // Wait for server to be ready with retry
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/health", address)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server not reachable after 20 attempts: {}", e),
        }
    }

    TestApp {
        address,
        client,
        db,
        schema,
        admin_pool,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn create_part(&self, business_id: &str, quantity: i32) -> Part {
        create_part(&self.db, business_id, quantity).await
    }

    pub async fn quantity(&self, part_id: Uuid) -> i32 {
        self.db
            .get_part(part_id)
            .await
            .expect("Failed to read part")
            .expect("Part should exist")
            .quantity
    }

    pub async fn cleanup(self) {
        self.db.pool().close().await;
        drop_schema(&self.admin_pool, &self.schema).await;
    }
}

/// Helper to intake a part.
pub async fn create_part(db: &Database, business_id: &str, quantity: i32) -> Part {
    db.create_part(&CreatePart {
        business_id: business_id.to_string(),
        name: format!("Part {}", business_id),
        initial_quantity: quantity,
        reorder_level: None,
        unit_cost: None,
        location_id: None,
        shelf_id: None,
    })
    .await
    .expect("Failed to create part")
}

pub fn metadata() -> MovementMetadata {
    MovementMetadata {
        issued_to: "Maintenance crew".to_string(),
        reason_code: ReasonCode::Maintenance,
        ..Default::default()
    }
}

pub fn movement(part_id: Uuid, quantity_delta: i32) -> CreateMovement {
    CreateMovement {
        part_id,
        quantity_delta,
        metadata: metadata(),
    }
}

pub fn movement_at(part_id: Uuid, quantity_delta: i32, issued_at: DateTime<Utc>) -> CreateMovement {
    CreateMovement {
        part_id,
        quantity_delta,
        metadata: MovementMetadata {
            issued_at_utc: Some(issued_at),
            ..metadata()
        },
    }
}

pub fn bulk(lines: &[(Uuid, i32)]) -> BulkMovementRequest {
    BulkMovementRequest {
        lines: lines
            .iter()
            .map(|&(part_id, quantity_delta)| BulkLine {
                part_id,
                quantity_delta,
            })
            .collect(),
        metadata: metadata(),
    }
}

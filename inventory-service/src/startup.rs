//! Application startup and lifecycle management.

use crate::config::InventoryConfig;
use crate::handlers;
use crate::services::{
    get_metrics, init_metrics, ChannelNotifier, Database, FanoutNotifier, LogNotifier,
    StockLedger,
};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InventoryConfig,
    pub db: Arc<Database>,
    pub ledger: Arc<StockLedger>,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "inventory-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "inventory-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
    bulk_events: ChannelNotifier,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InventoryConfig) -> Result<Self, AppError> {
        let db = Self::connect(&config).await?;
        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;
        Self::build_with_database(config, db).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: InventoryConfig) -> Result<Self, AppError> {
        let db = Self::connect(&config).await?;
        Self::build_with_database(config, db).await
    }

    /// Build the application around an already prepared database.
    pub async fn build_with_database(
        config: InventoryConfig,
        db: Database,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Arc::new(db);

        let bulk_events = ChannelNotifier::new(config.ledger.notification_channel_capacity);
        let notifier = FanoutNotifier::new()
            .with(Arc::new(LogNotifier))
            .with(Arc::new(bulk_events.clone()));

        let ledger = Arc::new(StockLedger::new(
            db.clone(),
            Arc::new(notifier),
            config.ledger.operation_timeout(),
        ));

        let state = AppState {
            config: config.clone(),
            db,
            ledger,
        };

        // Bind HTTP listener
        let http_addr = config.common.bind_address();
        let http_listener = TcpListener::bind(&http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Inventory service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
            bulk_events,
        })
    }

    async fn connect(config: &InventoryConfig) -> Result<Database, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
            config.database.acquire_timeout(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;
        Ok(db)
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Get the stock ledger engine.
    pub fn ledger(&self) -> Arc<StockLedger> {
        self.state.ledger.clone()
    }

    /// Subscribe to bulk completion events.
    pub fn subscribe_bulk_events(
        &self,
    ) -> tokio::sync::broadcast::Receiver<crate::models::BulkMovementApplied> {
        self.bulk_events.subscribe()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let health_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .with_state(health_state);

        let http_router = handlers::router(self.state.clone())
            .merge(health_router)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware));

        tracing::info!(
            service = "inventory-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, http_router)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}

//! Services module for inventory-service.

pub mod database;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod rules;

pub use database::Database;
pub use error::StockError;
pub use ledger::{DashboardTotal, StockLedger};
pub use metrics::{get_metrics, init_metrics, record_error, record_movement};
pub use notifier::{BulkMovementNotifier, ChannelNotifier, FanoutNotifier, LogNotifier};

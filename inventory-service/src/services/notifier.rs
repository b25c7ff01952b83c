//! Post-commit bulk completion events.
//!
//! The engine calls the notifier only after a bulk transaction has
//! committed. Delivery failures are reported back so the engine can log and
//! count them; they never affect the committed stock.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::BulkMovementApplied;

#[async_trait]
pub trait BulkMovementNotifier: Send + Sync {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn bulk_applied(&self, event: &BulkMovementApplied) -> anyhow::Result<()>;
}

/// Writes the event to the structured log. Default when no transport is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl BulkMovementNotifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn bulk_applied(&self, event: &BulkMovementApplied) -> anyhow::Result<()> {
        info!(
            lines_applied = event.lines_applied,
            parts_affected = event.parts_affected,
            timestamp = %event.timestamp,
            "Bulk movement applied"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: broadcast::Sender<BulkMovementApplied>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BulkMovementApplied> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl BulkMovementNotifier for ChannelNotifier {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn bulk_applied(&self, event: &BulkMovementApplied) -> anyhow::Result<()> {
        if self.sender.receiver_count() == 0 {
            debug!("No subscribers for bulk completion event");
            return Ok(());
        }
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Failed to broadcast bulk completion event: {}", e))
    }
}

/// Delivers to every inner notifier. One failing sink does not stop the
/// others; the first error is returned after all have been tried.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn BulkMovementNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn BulkMovementNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl BulkMovementNotifier for FanoutNotifier {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn bulk_applied(&self, event: &BulkMovementApplied) -> anyhow::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.bulk_applied(event).await {
                warn!(notifier = sink.name(), error = %e, "Notifier failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

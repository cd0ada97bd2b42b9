// SPDX-License-Identifier: MIT OR Apache-2.0
//! The outbox publisher.
//!
//! Drains pending events oldest-first and hands them to the notifier. A
//! failed delivery is marked and skipped; unrelated events keep flowing.

use crate::outbox::{Outbox, OutboxEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Delivery failure reported by a notifier.
#[derive(Debug, thiserror::Error)]
#[error("notification failed: {message}")]
pub struct NotifyError {
    /// What went wrong.
    pub message: String,
}

/// Downstream delivery of outbox events (the chat collaborator).
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event. Returning `Ok` acknowledges it.
    async fn notify(&self, event: &OutboxEvent) -> Result<(), NotifyError>;
}

/// Counters from one publish pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Events handed to the notifier.
    pub delivered: usize,
    /// Events whose delivery failed.
    pub failed: usize,
}

/// The publisher itself.
pub struct Publisher {
    outbox: Arc<dyn Outbox>,
    notifier: Arc<dyn Notifier>,
    batch: usize,
}

impl Publisher {
    /// Build a publisher over an outbox and a notifier.
    pub fn new(outbox: Arc<dyn Outbox>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            outbox,
            notifier,
            batch: 100,
        }
    }

    /// One FIFO pass over the pending events.
    pub async fn publish_once(&self) -> PublishStats {
        let mut stats = PublishStats::default();
        let pending = match self.outbox.pending(self.batch).await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "outbox read failed; skipping publish pass");
                return stats;
            }
        };

        for event in pending {
            match self.notifier.notify(&event).await {
                Ok(()) => {
                    if let Err(err) = self.outbox.mark_processed(event.id).await {
                        warn!(event = %event.id, error = %err, "mark_processed failed");
                    }
                    stats.delivered += 1;
                }
                Err(err) => {
                    warn!(event = %event.id, case_id = %event.case_id, error = %err, "delivery failed; will retry later");
                    if let Err(err) = self.outbox.mark_failed(event.id).await {
                        warn!(event = %event.id, error = %err, "mark_failed failed");
                    }
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Run until the shutdown flag flips, publishing on an interval.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            let stats = self.publish_once().await;
            if stats.delivered + stats.failed > 0 {
                info!(?stats, "publish pass complete");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Final drain so shutdown flushes what it can.
                        self.publish_once().await;
                        return;
                    }
                }
            }
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The background sweeper.
//!
//! Drains ready retry items: serial within one case so a case's retries
//! keep their order, parallel across cases up to a concurrency bound.

use crate::outbox::{Outbox, OutboxEventType};
use crate::queue::{RetryItem, RetryQueue, RetryStatus};
use odx_retry::RetryPolicy;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tracing::{info, warn};
use uuid::Uuid;

/// An attempt's failure, as seen by the sweeper.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SweepError {
    /// Human-readable failure description.
    pub message: String,
}

/// The work a retry item represents, supplied by the accounting layer.
#[async_trait::async_trait]
pub trait SweptExecutor: Send + Sync {
    /// Execute one claimed item. The executor owns its side effects
    /// (including success events); the sweeper owns queue bookkeeping.
    async fn execute(&self, item: &RetryItem) -> Result<(), SweepError>;
}

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Items attempted.
    pub attempted: usize,
    /// Items that went through.
    pub succeeded: usize,
    /// Items rescheduled after failure.
    pub rescheduled: usize,
    /// Items abandoned after exhausting retries.
    pub abandoned: usize,
}

/// The sweeper itself.
pub struct Sweeper {
    queue: Arc<dyn RetryQueue>,
    outbox: Arc<dyn Outbox>,
    executor: Arc<dyn SweptExecutor>,
    backoff: RetryPolicy,
    concurrency: Arc<Semaphore>,
    batch: usize,
}

impl Sweeper {
    /// Build a sweeper with the given cross-case concurrency bound.
    pub fn new(
        queue: Arc<dyn RetryQueue>,
        outbox: Arc<dyn Outbox>,
        executor: Arc<dyn SweptExecutor>,
        backoff: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            outbox,
            executor,
            backoff,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
            batch: 100,
        }
    }

    /// One pass over the ready items.
    pub async fn sweep_once(&self) -> SweepStats {
        let ready = match self.queue.get_ready(self.batch).await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "retry queue read failed; skipping sweep");
                return SweepStats::default();
            }
        };
        if ready.is_empty() {
            return SweepStats::default();
        }

        // Group by case to keep each case's retries serial.
        let mut per_case: BTreeMap<Uuid, Vec<RetryItem>> = BTreeMap::new();
        for item in ready {
            per_case.entry(item.case_id).or_default().push(item);
        }

        let mut handles = Vec::new();
        for (case_id, items) in per_case {
            let queue = self.queue.clone();
            let outbox = self.outbox.clone();
            let executor = self.executor.clone();
            let backoff = self.backoff;
            let concurrency = self.concurrency.clone();
            handles.push(tokio::spawn(async move {
                let _permit = concurrency.acquire().await;
                let mut stats = SweepStats::default();
                for item in items {
                    attempt_one(&queue, &outbox, &executor, &backoff, &mut stats, item).await;
                }
                (case_id, stats)
            }));
        }

        let mut total = SweepStats::default();
        for handle in handles {
            if let Ok((_case, stats)) = handle.await {
                total.attempted += stats.attempted;
                total.succeeded += stats.succeeded;
                total.rescheduled += stats.rescheduled;
                total.abandoned += stats.abandoned;
            }
        }
        total
    }

    /// Run until the shutdown flag flips, sweeping on an interval.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            let stats = self.sweep_once().await;
            if stats.attempted > 0 {
                info!(?stats, "sweep complete");
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// Claim one item, run it, and record the outcome on the queue.
async fn attempt_one(
    queue: &Arc<dyn RetryQueue>,
    outbox: &Arc<dyn Outbox>,
    executor: &Arc<dyn SweptExecutor>,
    backoff: &RetryPolicy,
    stats: &mut SweepStats,
    item: RetryItem,
) {
    let claimed = match queue.mark_in_progress(item.id).await {
        Ok(claimed) => claimed,
        Err(err) => {
            // Lost the claim race; another sweeper pass has it.
            warn!(item = %item.id, error = %err, "retry claim failed");
            return;
        }
    };
    stats.attempted += 1;

    match executor.execute(&claimed).await {
        Ok(()) => {
            if let Err(err) = queue.mark_succeeded(claimed.id).await {
                warn!(item = %claimed.id, error = %err, "mark_succeeded failed");
            }
            stats.succeeded += 1;
            info!(item = %claimed.id, case_id = %claimed.case_id, "queued call succeeded");
        }
        Err(sweep_err) => {
            match queue
                .mark_failed(claimed.id, &sweep_err.message, backoff)
                .await
            {
                Ok(updated) if updated.status == RetryStatus::Abandoned => {
                    stats.abandoned += 1;
                    let _ = outbox
                        .create_event(
                            OutboxEventType::RetryExhausted,
                            updated.case_id,
                            json!({
                                "retry_id": updated.id,
                                "fingerprint": updated.fingerprint,
                                "attempts": updated.attempt_count,
                                "last_error": sweep_err.message,
                            }),
                        )
                        .await;
                    warn!(item = %claimed.id, case_id = %claimed.case_id, "retries exhausted");
                }
                Ok(_) => {
                    stats.rescheduled += 1;
                }
                Err(err) => {
                    warn!(item = %claimed.id, error = %err, "mark_failed failed");
                }
            }
        }
    }
}

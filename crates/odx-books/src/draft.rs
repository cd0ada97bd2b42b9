// SPDX-License-Identifier: MIT OR Apache-2.0
//! Idempotent draft creation.
//!
//! The state machine of a draft attempt:
//!
//! ```text
//! new → fingerprint-checked → {duplicate-return | in-flight-reserved}
//!     → api-invoked → {success | rate-limited → retry | transient → retry
//!     | non-transient → queued | retries-exhausted → queued}
//! ```
//!
//! Success records the fingerprint and emits one `created` outbox event.
//! Anything else hands the order to the retry queue under the same
//! fingerprint, so the eventual success still emits exactly one event.

use crate::api::{BooksApi, BooksError, DraftCreated, DraftOrder};
use crate::fingerprint::{FingerprintStore, InsertOutcome};
use odx_core::{FingerprintLine, FingerprintState, order_fingerprint};
use odx_relay::{
    NewRetryItem, Outbox, OutboxEventType, RetryItem, RetryQueue, SweepError, SweptExecutor,
};
use odx_retry::RetryPolicy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// How a draft request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftOutcome {
    /// The draft was created by this call.
    Created {
        /// Sales-order id.
        id: String,
        /// Sales-order number.
        number: String,
    },
    /// A semantically identical draft already exists.
    Duplicate {
        /// Sales-order id of the existing draft.
        id: String,
        /// Sales-order number of the existing draft.
        number: String,
    },
    /// Another creator holds the fingerprint right now.
    InFlightElsewhere {
        /// The case that holds the row.
        case_id: Uuid,
    },
    /// The attempt failed and is parked in the retry queue.
    Queued {
        /// Retry-queue item id.
        queue_id: Uuid,
    },
}

/// Settings for the retry-queue handoff.
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// Attempts the queue may make.
    pub max_retries: u32,
    /// Delay before the queue's first attempt.
    pub initial_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(60),
        }
    }
}

/// The draft-creation engine.
pub struct DraftWriter {
    api: Arc<dyn BooksApi>,
    fingerprints: Arc<dyn FingerprintStore>,
    queue: Arc<dyn RetryQueue>,
    outbox: Arc<dyn Outbox>,
    policy: RetryPolicy,
    queue_settings: QueueSettings,
}

impl DraftWriter {
    /// Build a writer.
    pub fn new(
        api: Arc<dyn BooksApi>,
        fingerprints: Arc<dyn FingerprintStore>,
        queue: Arc<dyn RetryQueue>,
        outbox: Arc<dyn Outbox>,
        policy: RetryPolicy,
        queue_settings: QueueSettings,
    ) -> Self {
        Self {
            api,
            fingerprints,
            queue,
            outbox,
            policy,
            queue_settings,
        }
    }

    /// The fingerprint a draft order hashes to.
    pub fn fingerprint_of(order: &DraftOrder) -> String {
        let lines: Vec<FingerprintLine> = order
            .lines
            .iter()
            .map(|l| FingerprintLine {
                item_id: l.item_id.clone(),
                quantity: l.quantity,
                rate: l.rate,
            })
            .collect();
        order_fingerprint(&order.customer_id, &lines, order.date)
    }

    /// Create a draft, idempotently.
    pub async fn create_draft(&self, order: &DraftOrder) -> DraftOutcome {
        let fingerprint = Self::fingerprint_of(order);

        // Claim the fingerprint row. A lost race against a finished draft
        // is the duplicate path; a lost race against a live attempt means
        // someone else is already creating this exact order.
        let mut claimed = false;
        for _ in 0..2 {
            match self.fingerprints.try_claim(&fingerprint, order.case_id).await {
                InsertOutcome::Inserted(_) => {
                    claimed = true;
                    break;
                }
                InsertOutcome::Lost(row) => match row.state {
                    FingerprintState::Created {
                        order_id,
                        order_number,
                    } => {
                        info!(case_id = %order.case_id, fingerprint = %fingerprint, "duplicate draft request");
                        return DraftOutcome::Duplicate {
                            id: order_id,
                            number: order_number,
                        };
                    }
                    FingerprintState::InFlight => {
                        return DraftOutcome::InFlightElsewhere {
                            case_id: row.case_id,
                        };
                    }
                    FingerprintState::Failed => {
                        // The row became claimable between read and claim.
                        continue;
                    }
                },
            }
        }
        if !claimed {
            return DraftOutcome::InFlightElsewhere {
                case_id: order.case_id,
            };
        }

        match self.post_with_retries(order).await {
            Ok(created) => {
                self.fingerprints
                    .mark_created(&fingerprint, &created.id, &created.number)
                    .await;
                let _ = self
                    .outbox
                    .create_event(
                        OutboxEventType::Created,
                        order.case_id,
                        json!({
                            "draft_id": created.id,
                            "draft_number": created.number,
                            "fingerprint": fingerprint,
                        }),
                    )
                    .await;
                info!(case_id = %order.case_id, draft_id = %created.id, "draft created");
                DraftOutcome::Created {
                    id: created.id,
                    number: created.number,
                }
            }
            Err(err) => self.park(order, &fingerprint, err).await,
        }
    }

    /// POST with in-call handling of rate limits and transient failures.
    async fn post_with_retries(&self, order: &DraftOrder) -> Result<DraftCreated, BooksError> {
        let mut attempt = 0u32;
        loop {
            match self.api.create_draft(order).await {
                Ok(created) => return Ok(created),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || !self.policy.allows_retry(attempt) {
                        return Err(err);
                    }
                    let delay = match &err {
                        BooksError::RateLimited {
                            retry_after: Some(after),
                        } => *after,
                        _ => self.policy.delay_for(attempt - 1),
                    };
                    warn!(case_id = %order.case_id, attempt, delay_ms = delay.as_millis() as u64, error = %err, "draft POST will retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Hand the failed attempt to the retry queue and emit `failed`.
    async fn park(&self, order: &DraftOrder, fingerprint: &str, err: BooksError) -> DraftOutcome {
        self.fingerprints.mark_failed(fingerprint).await;

        let payload = match serde_json::to_value(order) {
            Ok(value) => value,
            Err(encode_err) => {
                warn!(case_id = %order.case_id, error = %encode_err, "draft payload failed to encode; cannot queue");
                return DraftOutcome::Queued {
                    queue_id: Uuid::nil(),
                };
            }
        };

        let queued = self
            .queue
            .enqueue(NewRetryItem {
                case_id: order.case_id,
                payload,
                fingerprint: fingerprint.to_string(),
                max_retries: self.queue_settings.max_retries,
                initial_delay: self.queue_settings.initial_delay,
            })
            .await;

        let queue_id = match queued {
            Ok(item) => item.id,
            Err(queue_err) => {
                warn!(case_id = %order.case_id, error = %queue_err, "retry enqueue failed");
                Uuid::nil()
            }
        };

        let _ = self
            .outbox
            .create_event(
                OutboxEventType::Failed,
                order.case_id,
                json!({
                    "fingerprint": fingerprint,
                    "queue_id": queue_id,
                    "error": err.to_string(),
                }),
            )
            .await;

        warn!(case_id = %order.case_id, queue_id = %queue_id, error = %err, "draft parked in retry queue");
        DraftOutcome::Queued { queue_id }
    }

    /// Compensation: forget an uncommitted fingerprint on cancellation.
    pub async fn clear_fingerprint(&self, order: &DraftOrder) {
        let fingerprint = Self::fingerprint_of(order);
        self.fingerprints.clear_if_not_created(&fingerprint).await;
    }
}

#[async_trait::async_trait]
impl SweptExecutor for DraftWriter {
    /// Retry one parked draft. A single POST per sweep attempt; the
    /// sweeper owns the backoff schedule.
    async fn execute(&self, item: &RetryItem) -> Result<(), SweepError> {
        let order: DraftOrder =
            serde_json::from_value(item.payload.clone()).map_err(|e| SweepError {
                message: format!("unreadable draft payload: {e}"),
            })?;

        // Already created (by a racing path)? Done, and no second event.
        if let Some(row) = self.fingerprints.read(&item.fingerprint).await {
            if matches!(row.state, FingerprintState::Created { .. }) {
                return Ok(());
            }
        }

        match self.fingerprints.try_claim(&item.fingerprint, order.case_id).await {
            InsertOutcome::Inserted(_) => {}
            InsertOutcome::Lost(row) => match row.state {
                FingerprintState::Created { .. } => return Ok(()),
                FingerprintState::InFlight => {
                    return Err(SweepError {
                        message: "fingerprint held by a live attempt".into(),
                    });
                }
                FingerprintState::Failed => {}
            },
        }

        match self.api.create_draft(&order).await {
            Ok(created) => {
                self.fingerprints
                    .mark_created(&item.fingerprint, &created.id, &created.number)
                    .await;
                let _ = self
                    .outbox
                    .create_event(
                        OutboxEventType::Created,
                        order.case_id,
                        json!({
                            "draft_id": created.id,
                            "draft_number": created.number,
                            "fingerprint": item.fingerprint,
                        }),
                    )
                    .await;
                Ok(())
            }
            Err(err) => {
                self.fingerprints.mark_failed(&item.fingerprint).await;
                Err(SweepError {
                    message: err.to_string(),
                })
            }
        }
    }
}

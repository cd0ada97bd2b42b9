// SPDX-License-Identifier: MIT OR Apache-2.0
//! The retry queue.
//!
//! Failed outbound calls are persisted here and retried with bounded
//! exponential backoff. `attempt_count` only ever grows, and a failed
//! item's `next_retry_at` strictly increases until the backoff cap.

use crate::RelayError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use odx_retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Retention of succeeded items.
const SUCCEEDED_TTL_DAYS: i64 = 7;
/// Retention of abandoned items.
const ABANDONED_TTL_DAYS: i64 = 30;

/// Lifecycle state of a retry item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStatus {
    /// Waiting for its next attempt.
    Pending,
    /// An attempt is running right now.
    InProgress,
    /// The call eventually went through.
    Succeeded,
    /// Attempts are exhausted; kept for inspection until the TTL.
    Abandoned,
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryFailure {
    /// When the attempt failed.
    pub at: DateTime<Utc>,
    /// The error message.
    pub message: String,
}

/// A persisted retry item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryItem {
    /// Item id (document id).
    pub id: Uuid,
    /// Case the call belongs to (partition key).
    pub case_id: Uuid,
    /// The call payload, interpreted by the executor.
    pub payload: serde_json::Value,
    /// Fingerprint of the draft attempt this item retries.
    pub fingerprint: String,
    /// Attempts made so far. Non-decreasing.
    pub attempt_count: u32,
    /// Attempts allowed in total.
    pub max_retries: u32,
    /// Earliest instant of the next attempt.
    pub next_retry_at: DateTime<Utc>,
    /// When the last attempt started, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Every failure seen so far.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_history: Vec<RetryFailure>,
    /// Current state.
    pub status: RetryStatus,
    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
    /// TTL marker set on terminal states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a caller supplies when enqueuing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRetryItem {
    /// Case the call belongs to.
    pub case_id: Uuid,
    /// The call payload.
    pub payload: serde_json::Value,
    /// Fingerprint of the draft attempt.
    pub fingerprint: String,
    /// Attempts allowed in total.
    pub max_retries: u32,
    /// Delay before the first attempt.
    pub initial_delay: std::time::Duration,
}

/// Persistent retry storage.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Persist a new item, due after its initial delay.
    async fn enqueue(&self, item: NewRetryItem) -> Result<RetryItem, RelayError>;

    /// Items that are `pending` and due, ordered by `next_retry_at`
    /// ascending, at most `limit`.
    async fn get_ready(&self, limit: usize) -> Result<Vec<RetryItem>, RelayError>;

    /// Claim an item for an attempt: bumps `attempt_count`, stamps
    /// `last_attempted_at`, and moves it to `in-progress`.
    async fn mark_in_progress(&self, id: Uuid) -> Result<RetryItem, RelayError>;

    /// The attempt went through.
    async fn mark_succeeded(&self, id: Uuid) -> Result<RetryItem, RelayError>;

    /// The attempt failed: append to history and either reschedule with
    /// backoff or abandon once attempts are exhausted.
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        backoff: &RetryPolicy,
    ) -> Result<RetryItem, RelayError>;

    /// Read one item.
    async fn get(&self, id: Uuid) -> Result<RetryItem, RelayError>;
}

// ---------------------------------------------------------------------------
// Memory implementation
// ---------------------------------------------------------------------------

/// `HashMap`-backed retry queue.
#[derive(Debug, Default)]
pub struct MemoryRetryQueue {
    items: RwLock<HashMap<Uuid, RetryItem>>,
}

impl MemoryRetryQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every item, for tests and diagnostics.
    pub async fn items(&self) -> Vec<RetryItem> {
        let mut out: Vec<RetryItem> = self.items.read().await.values().cloned().collect();
        out.sort_by_key(|i| i.created_at);
        out
    }
}

#[async_trait]
impl RetryQueue for MemoryRetryQueue {
    async fn enqueue(&self, new: NewRetryItem) -> Result<RetryItem, RelayError> {
        let now = Utc::now();
        let item = RetryItem {
            id: Uuid::new_v4(),
            case_id: new.case_id,
            payload: new.payload,
            fingerprint: new.fingerprint,
            attempt_count: 0,
            max_retries: new.max_retries,
            next_retry_at: now
                + ChronoDuration::from_std(new.initial_delay).unwrap_or(ChronoDuration::zero()),
            last_attempted_at: None,
            error_history: Vec::new(),
            status: RetryStatus::Pending,
            created_at: now,
            expires_at: None,
        };
        self.items.write().await.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_ready(&self, limit: usize) -> Result<Vec<RetryItem>, RelayError> {
        let now = Utc::now();
        let guard = self.items.read().await;
        let mut ready: Vec<RetryItem> = guard
            .values()
            .filter(|i| i.status == RetryStatus::Pending && i.next_retry_at <= now)
            .cloned()
            .collect();
        ready.sort_by_key(|i| i.next_retry_at);
        ready.truncate(limit);
        Ok(ready)
    }

    async fn mark_in_progress(&self, id: Uuid) -> Result<RetryItem, RelayError> {
        let mut guard = self.items.write().await;
        let item = guard.get_mut(&id).ok_or(RelayError::NotFound { id })?;
        if item.status != RetryStatus::Pending {
            return Err(RelayError::InvalidState {
                id,
                state: format!("{:?}", item.status),
            });
        }
        item.status = RetryStatus::InProgress;
        item.attempt_count += 1;
        item.last_attempted_at = Some(Utc::now());
        Ok(item.clone())
    }

    async fn mark_succeeded(&self, id: Uuid) -> Result<RetryItem, RelayError> {
        let mut guard = self.items.write().await;
        let item = guard.get_mut(&id).ok_or(RelayError::NotFound { id })?;
        item.status = RetryStatus::Succeeded;
        item.expires_at = Some(Utc::now() + ChronoDuration::days(SUCCEEDED_TTL_DAYS));
        Ok(item.clone())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        backoff: &RetryPolicy,
    ) -> Result<RetryItem, RelayError> {
        let mut guard = self.items.write().await;
        let item = guard.get_mut(&id).ok_or(RelayError::NotFound { id })?;
        let now = Utc::now();
        item.error_history.push(RetryFailure {
            at: now,
            message: error.to_string(),
        });

        if item.attempt_count >= item.max_retries {
            item.status = RetryStatus::Abandoned;
            item.expires_at = Some(now + ChronoDuration::days(ABANDONED_TTL_DAYS));
        } else {
            let delay = backoff.delay_for(item.attempt_count.saturating_sub(1));
            item.status = RetryStatus::Pending;
            item.next_retry_at =
                now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
        }
        Ok(item.clone())
    }

    async fn get(&self, id: Uuid) -> Result<RetryItem, RelayError> {
        self.items
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RelayError::NotFound { id })
    }
}

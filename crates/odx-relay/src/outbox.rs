// SPDX-License-Identifier: MIT OR Apache-2.0
//! The durable event outbox.
//!
//! Append-only: components write events here in the same logical step as
//! their state change, and the publisher delivers them at least once.

use crate::RelayError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Retention of processed events.
const PROCESSED_TTL_DAYS: i64 = 30;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutboxEventType {
    /// A draft was created in the accounting system.
    Created,
    /// A draft attempt failed and was queued for retry.
    Failed,
    /// Retries were exhausted and the attempt was abandoned.
    RetryExhausted,
}

/// Delivery state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutboxStatus {
    /// Not yet delivered.
    Pending,
    /// Delivered and acknowledged.
    Processed,
    /// Delivery failed; the publisher will come back to it.
    Failed,
}

/// One outbox event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Event id (document id).
    pub id: Uuid,
    /// Case the event belongs to (partition key).
    pub case_id: Uuid,
    /// What happened.
    pub event_type: OutboxEventType,
    /// Event payload for the notifier.
    pub payload: serde_json::Value,
    /// When the event was appended.
    pub created_at: DateTime<Utc>,
    /// When the event was acknowledged, once processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Delivery state.
    pub status: OutboxStatus,
    /// Delivery attempts so far.
    pub retry_count: u32,
    /// TTL marker set once processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Durable event storage.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Append a pending event, returning its id.
    async fn create_event(
        &self,
        event_type: OutboxEventType,
        case_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Uuid, RelayError>;

    /// Undelivered events, oldest first, at most `limit`. Previously failed
    /// events are included; a failed delivery never blocks the queue, it
    /// just moves to the back of the retry line.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, RelayError>;

    /// The notifier acknowledged the event.
    async fn mark_processed(&self, id: Uuid) -> Result<(), RelayError>;

    /// Delivery failed; bump the retry count.
    async fn mark_failed(&self, id: Uuid) -> Result<(), RelayError>;
}

// ---------------------------------------------------------------------------
// Memory implementation
// ---------------------------------------------------------------------------

/// `HashMap`-backed outbox.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    events: RwLock<HashMap<Uuid, OutboxEvent>>,
}

impl MemoryOutbox {
    /// An empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event in append order, for tests.
    pub async fn events(&self) -> Vec<OutboxEvent> {
        let mut out: Vec<OutboxEvent> = self.events.read().await.values().cloned().collect();
        out.sort_by_key(|e| e.created_at);
        out
    }

    /// Events of one type, for tests.
    pub async fn events_of(&self, event_type: OutboxEventType) -> Vec<OutboxEvent> {
        self.events()
            .await
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

#[async_trait]
impl Outbox for MemoryOutbox {
    async fn create_event(
        &self,
        event_type: OutboxEventType,
        case_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Uuid, RelayError> {
        let event = OutboxEvent {
            id: Uuid::new_v4(),
            case_id,
            event_type,
            payload,
            created_at: Utc::now(),
            processed_at: None,
            status: OutboxStatus::Pending,
            retry_count: 0,
            expires_at: None,
        };
        let id = event.id;
        self.events.write().await.insert(id, event);
        Ok(id)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, RelayError> {
        let guard = self.events.read().await;
        let mut out: Vec<OutboxEvent> = guard
            .values()
            .filter(|e| matches!(e.status, OutboxStatus::Pending | OutboxStatus::Failed))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), RelayError> {
        let mut guard = self.events.write().await;
        let event = guard.get_mut(&id).ok_or(RelayError::NotFound { id })?;
        let now = Utc::now();
        event.status = OutboxStatus::Processed;
        event.processed_at = Some(now);
        event.expires_at = Some(now + ChronoDuration::days(PROCESSED_TTL_DAYS));
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), RelayError> {
        let mut guard = self.events.write().await;
        let event = guard.get_mut(&id).ok_or(RelayError::NotFound { id })?;
        event.status = OutboxStatus::Failed;
        event.retry_count += 1;
        Ok(())
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fingerprint rows.
//!
//! The fingerprint is the row key that makes draft creation idempotent:
//! exactly one creator wins the conditional insert, everyone else re-reads
//! the winning row.

use async_trait::async_trait;
use chrono::Utc;
use odx_core::{FingerprintRecord, FingerprintState};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of the conditional insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// This caller owns the row and may POST.
    Inserted(FingerprintRecord),
    /// Another caller got there first; here is the winning row.
    Lost(FingerprintRecord),
}

/// Persistent fingerprint rows.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Read a row.
    async fn read(&self, fingerprint: &str) -> Option<FingerprintRecord>;

    /// Conditionally insert an `in-flight` row. Single-writer: exactly one
    /// concurrent caller gets [`InsertOutcome::Inserted`]. A `failed` row
    /// may be taken over the same way.
    async fn try_claim(&self, fingerprint: &str, case_id: Uuid) -> InsertOutcome;

    /// Record the created draft on the row.
    async fn mark_created(&self, fingerprint: &str, order_id: &str, order_number: &str);

    /// Record that the attempt failed and was queued.
    async fn mark_failed(&self, fingerprint: &str);

    /// Remove the row unless a draft was actually created. Compensation
    /// path for cancellation.
    async fn clear_if_not_created(&self, fingerprint: &str);
}

/// `HashMap`-backed fingerprint store.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    rows: Mutex<HashMap<String, FingerprintRecord>>,
}

impl MemoryFingerprintStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for MemoryFingerprintStore {
    async fn read(&self, fingerprint: &str) -> Option<FingerprintRecord> {
        self.rows.lock().await.get(fingerprint).cloned()
    }

    async fn try_claim(&self, fingerprint: &str, case_id: Uuid) -> InsertOutcome {
        let mut guard = self.rows.lock().await;
        match guard.get(fingerprint) {
            Some(existing) if !matches!(existing.state, FingerprintState::Failed) => {
                InsertOutcome::Lost(existing.clone())
            }
            _ => {
                let now = Utc::now();
                let row = FingerprintRecord {
                    fingerprint: fingerprint.to_string(),
                    case_id,
                    state: FingerprintState::InFlight,
                    created_at: now,
                    updated_at: now,
                };
                guard.insert(fingerprint.to_string(), row.clone());
                InsertOutcome::Inserted(row)
            }
        }
    }

    async fn mark_created(&self, fingerprint: &str, order_id: &str, order_number: &str) {
        let mut guard = self.rows.lock().await;
        if let Some(row) = guard.get_mut(fingerprint) {
            row.state = FingerprintState::Created {
                order_id: order_id.to_string(),
                order_number: order_number.to_string(),
            };
            row.updated_at = Utc::now();
        }
    }

    async fn mark_failed(&self, fingerprint: &str) {
        let mut guard = self.rows.lock().await;
        if let Some(row) = guard.get_mut(fingerprint) {
            row.state = FingerprintState::Failed;
            row.updated_at = Utc::now();
        }
    }

    async fn clear_if_not_created(&self, fingerprint: &str) {
        let mut guard = self.rows.lock().await;
        if let Some(row) = guard.get(fingerprint) {
            if !matches!(row.state, FingerprintState::Created { .. }) {
                guard.remove(fingerprint);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_claim_wins_second_loses() {
        let store = MemoryFingerprintStore::new();
        let first = store.try_claim("fp", Uuid::from_u128(1)).await;
        assert!(matches!(first, InsertOutcome::Inserted(_)));
        let second = store.try_claim("fp", Uuid::from_u128(2)).await;
        match second {
            InsertOutcome::Lost(row) => assert_eq!(row.case_id, Uuid::from_u128(1)),
            other => panic!("expected lost claim, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_rows_can_be_taken_over() {
        let store = MemoryFingerprintStore::new();
        store.try_claim("fp", Uuid::from_u128(1)).await;
        store.mark_failed("fp").await;
        let retaken = store.try_claim("fp", Uuid::from_u128(1)).await;
        assert!(matches!(retaken, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn created_rows_survive_compensation() {
        let store = MemoryFingerprintStore::new();
        store.try_claim("fp", Uuid::nil()).await;
        store.mark_created("fp", "so-1", "SO-0001").await;
        store.clear_if_not_created("fp").await;
        assert!(store.read("fp").await.is_some());
    }

    #[tokio::test]
    async fn in_flight_rows_are_cleared_by_compensation() {
        let store = MemoryFingerprintStore::new();
        store.try_claim("fp", Uuid::nil()).await;
        store.clear_if_not_created("fp").await;
        assert!(store.read("fp").await.is_none());
    }
}

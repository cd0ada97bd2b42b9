// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory store implementations, used in tests and as the default for
//! local development.

use crate::audit::{AuditRecord, AuditSink};
use crate::{CaseFilter, CaseStore, StoreError, matches_filter};
use async_trait::async_trait;
use chrono::Utc;
use odx_core::Case;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// `HashMap`-backed case store.
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    cases: RwLock<HashMap<(String, Uuid), Case>>,
}

impl MemoryCaseStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn create(&self, case: Case) -> Result<(), StoreError> {
        let key = (case.tenant_id.clone(), case.case_id);
        let mut guard = self.cases.write().await;
        if guard.contains_key(&key) {
            return Err(StoreError::Duplicate {
                case_id: case.case_id,
            });
        }
        guard.insert(key, case);
        Ok(())
    }

    async fn read(&self, tenant_id: &str, case_id: Uuid) -> Result<Case, StoreError> {
        self.cases
            .read()
            .await
            .get(&(tenant_id.to_string(), case_id))
            .cloned()
            .ok_or(StoreError::NotFound { case_id })
    }

    async fn update(&self, mut case: Case) -> Result<Case, StoreError> {
        let key = (case.tenant_id.clone(), case.case_id);
        let mut guard = self.cases.write().await;
        let stored = guard.get(&key).ok_or(StoreError::NotFound {
            case_id: case.case_id,
        })?;
        if stored.version != case.version {
            return Err(StoreError::VersionConflict {
                case_id: case.case_id,
                expected: case.version,
                stored: stored.version,
            });
        }
        case.version += 1;
        case.updated_at = Utc::now();
        guard.insert(key, case.clone());
        Ok(case)
    }

    async fn list_by_user(
        &self,
        tenant_id: &str,
        uploader: &str,
        filter: &CaseFilter,
    ) -> Result<Vec<Case>, StoreError> {
        let guard = self.cases.read().await;
        let mut out: Vec<Case> = guard
            .iter()
            .filter(|((tenant, _), case)| {
                tenant == tenant_id && matches_filter(case, uploader, filter)
            })
            .map(|(_, case)| case.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

/// `Vec`-backed audit sink, inspectable from tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) {
        self.records.write().await.push(record);
    }
}

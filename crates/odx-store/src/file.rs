// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed store implementations.
//!
//! One JSON document per case under `root/<tenant>/<case_id>.json`, and an
//! append-only JSONL audit log. Writes go through a tokio mutex so the
//! version check and the file write are atomic with respect to each other.

use crate::audit::{AuditRecord, AuditSink};
use crate::{CaseFilter, CaseStore, StoreError, matches_filter};
use async_trait::async_trait;
use chrono::Utc;
use odx_core::Case;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

fn storage_err(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Storage {
        reason: format!("{context}: {err}"),
    }
}

/// JSON-file-per-case store.
#[derive(Debug)]
pub struct FileCaseStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCaseStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn case_path(&self, tenant_id: &str, case_id: Uuid) -> PathBuf {
        self.root.join(tenant_id).join(format!("{case_id}.json"))
    }

    async fn load(&self, path: &Path) -> Result<Option<Case>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| storage_err("decode case", e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("read case", e)),
        }
    }

    async fn persist(&self, case: &Case) -> Result<(), StoreError> {
        let path = self.case_path(&case.tenant_id, case.case_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err("create tenant dir", e))?;
        }
        let bytes = serde_json::to_vec_pretty(case).map_err(|e| storage_err("encode case", e))?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| storage_err("write case", e))
    }
}

#[async_trait]
impl CaseStore for FileCaseStore {
    async fn create(&self, case: Case) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.case_path(&case.tenant_id, case.case_id);
        if self.load(&path).await?.is_some() {
            return Err(StoreError::Duplicate {
                case_id: case.case_id,
            });
        }
        self.persist(&case).await
    }

    async fn read(&self, tenant_id: &str, case_id: Uuid) -> Result<Case, StoreError> {
        let path = self.case_path(tenant_id, case_id);
        self.load(&path)
            .await?
            .ok_or(StoreError::NotFound { case_id })
    }

    async fn update(&self, mut case: Case) -> Result<Case, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.case_path(&case.tenant_id, case.case_id);
        let stored = self.load(&path).await?.ok_or(StoreError::NotFound {
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
        self.persist(&case).await?;
        Ok(case)
    }

    async fn list_by_user(
        &self,
        tenant_id: &str,
        uploader: &str,
        filter: &CaseFilter,
    ) -> Result<Vec<Case>, StoreError> {
        let dir = self.root.join(tenant_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err("read tenant dir", e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("iterate tenant dir", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load(&path).await {
                Ok(Some(case)) if matches_filter(&case, uploader, filter) => out.push(case),
                Ok(_) => {}
                Err(err) => {
                    error!(path = %path.display(), error = %err, "skipping unreadable case file");
                }
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// File audit sink
// ---------------------------------------------------------------------------

/// JSONL audit log, one record per line.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    /// Create a sink appending to the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, record: AuditRecord) {
        let _guard = self.write_lock.lock().await;
        let Ok(mut line) = serde_json::to_vec(&record) else {
            error!(case_id = %record.case_id, "audit record failed to encode");
            return;
        };
        line.push(b'\n');
        let result = async {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(&line).await
        }
        .await;
        if let Err(err) = result {
            // Audit loss is logged, never fatal to the mutation itself.
            error!(case_id = %record.case_id, error = %err, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odx_core::{ChatRef, SourceMeta};

    fn case(id: u128) -> Case {
        Case::new(
            Uuid::from_u128(id),
            "t1",
            SourceMeta {
                filename: "order.xlsx".into(),
                sha256: "00".repeat(32),
                uploader: "u@example.com".into(),
                chat: ChatRef::default(),
            },
        )
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCaseStore::new(dir.path());
        let c = case(7);
        store.create(c.clone()).await.unwrap();
        let back = store.read("t1", c.case_id).await.unwrap();
        assert_eq!(back, c);
    }

    #[tokio::test]
    async fn file_store_version_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCaseStore::new(dir.path());
        let c = case(7);
        store.create(c.clone()).await.unwrap();
        store.update(c.clone()).await.unwrap();
        let err = store.update(c).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn file_store_lists_by_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCaseStore::new(dir.path());
        store.create(case(1)).await.unwrap();
        store.create(case(2)).await.unwrap();
        let listed = store
            .list_by_user("t1", "u@example.com", &CaseFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn audit_sink_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path);
        sink.append(AuditRecord::new(
            Uuid::nil(),
            "test",
            "status_change",
            serde_json::json!({"to": "ready"}),
        ))
        .await;
        sink.append(AuditRecord::new(
            Uuid::nil(),
            "test",
            "patch",
            serde_json::json!({"ops": 1}),
        ))
        .await;
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}

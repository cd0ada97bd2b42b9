// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blob storage contracts.
//!
//! The workflow downloads the uploaded workbook from wherever the bot
//! collaborator parked it, and keeps an `incoming/` copy per case for the
//! retention trail.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Blob failures.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The URL does not resolve to a stored blob.
    #[error("blob not found: {url}")]
    NotFound {
        /// The missing URL.
        url: String,
    },

    /// Transport or storage failure.
    #[error("blob transfer failed: {reason}")]
    Transfer {
        /// What went wrong.
        reason: String,
    },
}

/// Fetching uploads and keeping per-case copies.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download the blob behind a URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError>;

    /// Keep the original under `incoming/{case_id}.xlsx`.
    async fn put_incoming(&self, case_id: Uuid, bytes: &[u8]) -> Result<(), BlobError>;
}

/// In-memory blob store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    incoming: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob under a URL (what the bot collaborator would do).
    pub async fn put(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().await.insert(url.into(), bytes);
    }

    /// The stored incoming copy for a case, if any.
    pub async fn incoming(&self, case_id: Uuid) -> Option<Vec<u8>> {
        self.incoming.read().await.get(&case_id).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                url: url.to_string(),
            })
    }

    async fn put_incoming(&self, case_id: Uuid, bytes: &[u8]) -> Result<(), BlobError> {
        self.incoming.write().await.insert(case_id, bytes.to_vec());
        Ok(())
    }
}

/// HTTP fetcher that writes incoming copies to local disk.
pub struct HttpBlobFetcher {
    client: reqwest::Client,
    incoming_dir: std::path::PathBuf,
}

impl HttpBlobFetcher {
    /// Build a fetcher keeping copies under the given directory.
    pub fn new(incoming_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            incoming_dir: incoming_dir.into(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobError::Transfer {
                reason: e.to_string(),
            })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound {
                url: url.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(BlobError::Transfer {
                reason: format!("HTTP {}", response.status()),
            });
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| BlobError::Transfer {
                reason: e.to_string(),
            })
    }

    async fn put_incoming(&self, case_id: Uuid, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.incoming_dir.join(format!("{case_id}.xlsx"));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Transfer {
                    reason: e.to_string(),
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| BlobError::Transfer {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        store.put("blob://a", vec![1, 2, 3]).await;
        assert_eq!(store.fetch("blob://a").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.fetch("blob://missing").await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn incoming_copies_are_kept_per_case() {
        let store = MemoryBlobStore::new();
        let case = Uuid::from_u128(9);
        store.put_incoming(case, &[7, 7]).await.unwrap();
        assert_eq!(store.incoming(case).await.unwrap(), vec![7, 7]);
    }
}

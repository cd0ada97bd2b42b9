// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalog caches.
//!
//! Customer and item catalogs load at startup and refresh on a timer.
//! Readers take an `Arc` snapshot, so a refresh in progress never shows a
//! half-updated catalog. Point lookups get per-entry TTL caching with
//! negative caching for 404s.

use crate::api::{BooksApi, BooksError};
use odx_core::{CustomerRecord, ItemRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{info, warn};

/// A consistent view of both catalogs.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// All customers.
    pub customers: Vec<CustomerRecord>,
    /// All items.
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Clone)]
struct EntryCacheSlot {
    fetched_at: Instant,
    /// `None` is a cached 404.
    item: Option<ItemRecord>,
}

/// The cache itself.
pub struct CatalogCache {
    api: Arc<dyn BooksApi>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    entry_ttl: Duration,
    entries: Mutex<HashMap<String, EntryCacheSlot>>,
}

impl CatalogCache {
    /// Load both catalogs and build the cache.
    pub async fn load(api: Arc<dyn BooksApi>, entry_ttl: Duration) -> Result<Self, BooksError> {
        let snapshot = Self::fetch(&api).await?;
        info!(
            customers = snapshot.customers.len(),
            items = snapshot.items.len(),
            "catalogs loaded"
        );
        Ok(Self {
            api,
            snapshot: RwLock::new(Arc::new(snapshot)),
            entry_ttl,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Build a cache over a pre-loaded snapshot. Used when the accounting
    /// system is not reachable at startup; the refresher fills it later.
    pub fn with_snapshot(
        api: Arc<dyn BooksApi>,
        snapshot: CatalogSnapshot,
        entry_ttl: Duration,
    ) -> Self {
        Self {
            api,
            snapshot: RwLock::new(Arc::new(snapshot)),
            entry_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(api: &Arc<dyn BooksApi>) -> Result<CatalogSnapshot, BooksError> {
        let customers = api.list_customers().await?;
        let items = api.list_items().await?;
        Ok(CatalogSnapshot { customers, items })
    }

    /// The current snapshot. Cheap; safe to hold across awaits.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Refresh both catalogs, atomically swapping the snapshot.
    pub async fn refresh(&self) -> Result<(), BooksError> {
        let fresh = Self::fetch(&self.api).await?;
        *self.snapshot.write().await = Arc::new(fresh);
        self.entries.lock().await.clear();
        Ok(())
    }

    /// One item by id, with per-entry TTL caching and negative caching.
    pub async fn item_by_id(&self, id: &str) -> Result<Option<ItemRecord>, BooksError> {
        {
            let guard = self.entries.lock().await;
            if let Some(slot) = guard.get(id) {
                if slot.fetched_at.elapsed() < self.entry_ttl {
                    return Ok(slot.item.clone());
                }
            }
        }

        let fetched = match self.api.get_item(id).await {
            Ok(item) => Some(item),
            Err(BooksError::NotFound) => None,
            Err(other) => return Err(other),
        };

        self.entries.lock().await.insert(
            id.to_string(),
            EntryCacheSlot {
                fetched_at: Instant::now(),
                item: fetched.clone(),
            },
        );
        Ok(fetched)
    }

    /// Refresh on an interval until shutdown. Failures keep the previous
    /// snapshot and log.
    pub async fn run_refresher(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = self.refresh().await {
                        warn!(error = %err, "catalog refresh failed; serving the previous snapshot");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DraftCreated, DraftOrder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingApi {
        item_calls: AtomicUsize,
        catalog_calls: AtomicUsize,
    }

    impl CountingApi {
        fn new() -> Self {
            Self {
                item_calls: AtomicUsize::new(0),
                catalog_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BooksApi for CountingApi {
        async fn list_customers(&self) -> Result<Vec<CustomerRecord>, BooksError> {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![CustomerRecord {
                id: "c-1".into(),
                name: "Acme Co.".into(),
            }])
        }

        async fn list_items(&self) -> Result<Vec<ItemRecord>, BooksError> {
            Ok(vec![ItemRecord {
                id: "it-1".into(),
                name: "Widget".into(),
                sku: Some("WID-01".into()),
                gtin: None,
                rate: 2.5,
            }])
        }

        async fn get_item(&self, id: &str) -> Result<ItemRecord, BooksError> {
            self.item_calls.fetch_add(1, Ordering::SeqCst);
            if id == "it-1" {
                Ok(ItemRecord {
                    id: "it-1".into(),
                    name: "Widget".into(),
                    sku: Some("WID-01".into()),
                    gtin: None,
                    rate: 2.5,
                })
            } else {
                Err(BooksError::NotFound)
            }
        }

        async fn create_draft(&self, _order: &DraftOrder) -> Result<DraftCreated, BooksError> {
            unreachable!("not used in catalog tests")
        }
    }

    #[tokio::test]
    async fn snapshot_is_loaded_at_startup() {
        let cache = CatalogCache::load(Arc::new(CountingApi::new()), Duration::from_secs(60))
            .await
            .unwrap();
        let snap = cache.snapshot().await;
        assert_eq!(snap.customers.len(), 1);
        assert_eq!(snap.items.len(), 1);
    }

    #[tokio::test]
    async fn item_lookups_hit_the_entry_cache() {
        let api = Arc::new(CountingApi::new());
        let cache = CatalogCache::load(api.clone(), Duration::from_secs(60))
            .await
            .unwrap();
        for _ in 0..3 {
            assert!(cache.item_by_id("it-1").await.unwrap().is_some());
        }
        assert_eq!(api.item_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_items_are_negatively_cached() {
        let api = Arc::new(CountingApi::new());
        let cache = CatalogCache::load(api.clone(), Duration::from_secs(60))
            .await
            .unwrap();
        for _ in 0..3 {
            assert!(cache.item_by_id("nope").await.unwrap().is_none());
        }
        assert_eq!(api.item_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_swaps_the_snapshot_atomically() {
        let api = Arc::new(CountingApi::new());
        let cache = CatalogCache::load(api.clone(), Duration::from_secs(60))
            .await
            .unwrap();
        let before = cache.snapshot().await;
        cache.refresh().await.unwrap();
        let after = cache.snapshot().await;
        // Old snapshot handles stay valid; the new one is a fresh Arc.
        assert_eq!(before.customers.len(), after.customers.len());
        assert_eq!(api.catalog_calls.load(Ordering::SeqCst), 2);
    }
}

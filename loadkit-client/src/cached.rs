use async_trait::async_trait;
use loadkit_common::{Document, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{DataAccess, Fields};

/// Minimum number of documents fetched per refresh.
const SNAPSHOT_WINDOW: usize = 100;

struct Snapshot {
    docs: Arc<Vec<Document>>,
    fetched_at: Instant,
    limit: usize,
}

/// Wraps a store with per-collection list snapshots, refreshed on demand.
///
/// `list` is served from the snapshot while it is younger than `max_age` and was fetched with a
/// large enough limit. Writes go straight through and drop the collection's snapshot. A snapshot
/// is replaced whole, so a reader never observes a partially refreshed list.
pub struct CachedStore {
    inner: Arc<dyn DataAccess>,
    max_age: Duration,
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn DataAccess>, max_age: Duration) -> Self {
        Self { inner, max_age, snapshots: RwLock::new(HashMap::new()) }
    }

    /// Current snapshot for `collection`, if one has been fetched.
    pub async fn snapshot(&self, collection: &str) -> Option<Arc<Vec<Document>>> {
        self.snapshots.read().await.get(collection).map(|s| Arc::clone(&s.docs))
    }

    /// Fetch a fresh snapshot regardless of age.
    pub async fn refresh(&self, collection: &str, limit: usize) -> Result<Arc<Vec<Document>>> {
        let limit = limit.max(SNAPSHOT_WINDOW);
        let docs = Arc::new(self.inner.list(collection, limit).await?);
        debug!(collection, count = docs.len(), "snapshot refreshed");
        self.snapshots.write().await.insert(
            collection.to_string(),
            Snapshot { docs: Arc::clone(&docs), fetched_at: Instant::now(), limit },
        );
        Ok(docs)
    }

    async fn invalidate(&self, collection: &str) {
        self.snapshots.write().await.remove(collection);
    }

    async fn fresh_snapshot(&self, collection: &str, limit: usize) -> Option<Arc<Vec<Document>>> {
        let guard = self.snapshots.read().await;
        guard
            .get(collection)
            .filter(|s| s.limit >= limit && s.fetched_at.elapsed() < self.max_age)
            .map(|s| Arc::clone(&s.docs))
    }
}

#[async_trait]
impl DataAccess for CachedStore {
    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<Document>> {
        let docs = match self.fresh_snapshot(collection, limit).await {
            Some(docs) => docs,
            None => self.refresh(collection, limit).await?,
        };
        Ok(docs.iter().take(limit).cloned().collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.inner.count(collection).await
    }

    async fn find_by(&self, collection: &str, field: &str, value: &Value, limit: usize) -> Result<Vec<Document>> {
        self.inner.find_by(collection, field, value, limit).await
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = self.inner.create(collection, fields).await?;
        self.invalidate(collection).await;
        Ok(id)
    }

    async fn create_batch(&self, collection: &str, docs: Vec<Fields>) -> Result<Vec<String>> {
        let ids = self.inner.create_batch(collection, docs).await?;
        self.invalidate(collection).await;
        Ok(ids)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.inner.update(collection, id, fields).await?;
        self.invalidate(collection).await;
        Ok(())
    }
}

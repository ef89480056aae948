use async_trait::async_trait;
use loadkit_common::{Clock, Document, Result, StoreError, SystemClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{DataAccess, Fields};

/// In-process store. Documents are kept per collection in creation order.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { collections: RwLock::new(HashMap::new()), clock }
    }

    fn new_document(&self, fields: Fields) -> Document {
        Document {
            id: Uuid::new_v4().simple().to_string(),
            created_at: self.clock.unix_now_ms(),
            fields,
        }
    }
}

#[async_trait]
impl DataAccess for MemoryStore {
    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn find_by(&self, collection: &str, field: &str, value: &Value, limit: usize) -> Result<Vec<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .rev()
                    .filter(|d| d.field(field) == Some(value))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let doc = self.new_document(fields);
        let id = doc.id.clone();
        let mut guard = self.collections.write().await;
        guard.entry(collection.to_string()).or_default().push(doc);
        Ok(id)
    }

    async fn create_batch(&self, collection: &str, docs: Vec<Fields>) -> Result<Vec<String>> {
        let docs: Vec<Document> = docs.into_iter().map(|f| self.new_document(f)).collect();
        let ids = docs.iter().map(|d| d.id.clone()).collect();
        let mut guard = self.collections.write().await;
        guard.entry(collection.to_string()).or_default().extend(docs);
        Ok(ids)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut guard = self.collections.write().await;
        let doc = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        doc.fields.extend(fields);
        Ok(())
    }
}

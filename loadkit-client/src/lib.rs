//! Data-access capability consumed by workloads.
//!
//! [`DataAccess`] is the only way a behavior touches the store. Three implementations ship here:
//! [`HttpStore`] talks to a running `loadkit-server`, [`MemoryStore`] keeps everything in-process,
//! and [`CachedStore`] wraps either one with refresh-on-demand list snapshots.

use async_trait::async_trait;
use loadkit_common::{Document, Result};
use serde_json::{Map, Value};

mod cached;
mod http;
mod memory;

pub use cached::CachedStore;
pub use http::{HttpStore, StoreConfig};
pub use memory::MemoryStore;

pub type Fields = Map<String, Value>;

/// CRUD over JSON documents grouped into named collections.
///
/// Implementations provide their own concurrency safety.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Most recently created documents first.
    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Documents whose `field` equals `value`, most recent first.
    async fn find_by(&self, collection: &str, field: &str, value: &Value, limit: usize) -> Result<Vec<Document>>;

    /// Returns the new document's id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Returns the new ids in input order.
    async fn create_batch(&self, collection: &str, docs: Vec<Fields>) -> Result<Vec<String>>;

    /// Merge `fields` into an existing document. `NotFound` if `id` does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;
}

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod error;
pub mod sample;
pub mod schema;

pub use error::{ConfigError, DeliveryError, EmptyInputError, RunError, StoreError};
pub use sample::{AggregateMetrics, Category, LatencySummary, OperationOutcome, ReportPayload, Sample};
pub use schema::{BehaviorConfig, ConfigField, ConfigSchema, FieldKind};

/// Collection the example workloads write to unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "items";

/// Abstraction over wall-clock time for testability.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn unix_now_ms(&self) -> u64;
}

/// Production clock backed by `SystemTime`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// JSON error envelope returned by the server for all error responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A stored document: server-assigned id and creation time plus free-form JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Result type for data-access operations
pub type Result<T> = std::result::Result<T, StoreError>;

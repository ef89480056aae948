use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of operation a sample measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Query,
    Mutation,
    Action,
}

impl Category {
    pub fn as_name(&self) -> &'static str {
        match self {
            Category::Query => "query",
            Category::Mutation => "mutation",
            Category::Action => "action",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

/// Outcome of one operation as reported by a behavior, before it is timestamped.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub category: Category,
    pub operation_name: String,
    pub latency_ms: f64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl OperationOutcome {
    pub fn success(category: Category, operation_name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            category,
            operation_name: operation_name.into(),
            latency_ms,
            success: true,
            error_message: None,
        }
    }

    pub fn failure(
        category: Category,
        operation_name: impl Into<String>,
        latency_ms: f64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            operation_name: operation_name.into(),
            latency_ms,
            success: false,
            error_message: Some(error_message.into()),
        }
    }

    /// Attach a timestamp (milliseconds since the Unix epoch).
    pub fn stamped(self, timestamp: u64) -> Sample {
        Sample {
            category: self.category,
            operation_name: self.operation_name,
            latency_ms: self.latency_ms,
            success: self.success,
            timestamp,
            error_message: self.error_message,
        }
    }
}

/// One recorded operation outcome. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub category: Category,
    pub operation_name: String,
    pub latency_ms: f64,
    pub success: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Counts, latency distribution and throughput over a set of samples.
///
/// Percentiles, min, max and mean cover successful samples only; counts cover both outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub total_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Samples per second since the collector's window started.
    pub throughput: f64,
}

impl LatencySummary {
    pub fn error_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.total_count as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    #[serde(flatten)]
    pub overall: LatencySummary,
    /// Only categories with at least one sample are present.
    pub by_category: BTreeMap<Category, LatencySummary>,
}

/// Body delivered to a flush sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub client_id: String,
    /// Milliseconds since the Unix epoch at flush time.
    pub timestamp: u64,
    pub records: Vec<Sample>,
    pub metrics: AggregateMetrics,
}

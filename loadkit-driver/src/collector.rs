use loadkit_common::{AggregateMetrics, Clock, LatencySummary, OperationOutcome, Sample, SystemClock};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

struct Buffer {
    samples: Vec<Sample>,
    window_start: Instant,
    last_timestamp: u64,
}

/// Append-only buffer of samples with on-demand aggregation.
///
/// All operations take one short lock; none of them await while holding it.
pub struct Collector {
    buffer: Mutex<Buffer>,
    clock: Arc<dyn Clock>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buffer: Mutex::new(Buffer { samples: Vec::new(), window_start: Instant::now(), last_timestamp: 0 }),
            clock,
        }
    }

    pub fn record(&self, sample: Sample) {
        let mut buffer = self.buffer.lock();
        buffer.last_timestamp = buffer.last_timestamp.max(sample.timestamp);
        buffer.samples.push(sample);
    }

    /// Stamp `outcome` with the current time and append it. Stamps never go backwards.
    /// Returns the recorded sample and the buffer length after the append.
    pub fn record_outcome(&self, outcome: OperationOutcome) -> (Sample, usize) {
        let now = self.clock.unix_now_ms();
        let mut buffer = self.buffer.lock();
        let timestamp = now.max(buffer.last_timestamp);
        buffer.last_timestamp = timestamp;
        let sample = outcome.stamped(timestamp);
        buffer.samples.push(sample.clone());
        (sample, buffer.samples.len())
    }

    /// Copy of the buffer in arrival order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.lock().samples.clone()
    }

    /// Empty the buffer; the throughput window keeps running.
    pub fn clear(&self) {
        self.buffer.lock().samples.clear();
    }

    /// Empty the buffer and restart the throughput window.
    pub fn reset(&self) {
        let mut buffer = self.buffer.lock();
        buffer.samples.clear();
        buffer.window_start = Instant::now();
    }

    pub fn count(&self) -> usize {
        self.buffer.lock().samples.len()
    }

    pub fn metrics(&self) -> AggregateMetrics {
        let buffer = self.buffer.lock();
        aggregate(&buffer.samples, buffer.window_start.elapsed().as_secs_f64())
    }

    /// Swap the buffer out and aggregate what was taken, as one atomic step.
    ///
    /// A sample recorded concurrently lands either in the returned batch or in the fresh buffer,
    /// never both.
    pub fn drain(&self) -> (Vec<Sample>, AggregateMetrics) {
        let mut buffer = self.buffer.lock();
        let samples = std::mem::take(&mut buffer.samples);
        let metrics = aggregate(&samples, buffer.window_start.elapsed().as_secs_f64());
        (samples, metrics)
    }
}

/// Sorted-ascending `latencies` → value at index `ceil(len * p) - 1`, clamped. 0 when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() as f64 * p).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// Summarise `samples` observed over `elapsed_secs`.
pub fn summarize<'a>(samples: impl IntoIterator<Item = &'a Sample>, elapsed_secs: f64) -> LatencySummary {
    let mut total_count = 0u64;
    let mut latencies = Vec::new();
    for sample in samples {
        total_count += 1;
        if sample.success {
            latencies.push(sample.latency_ms);
        }
    }
    latencies.sort_by(f64::total_cmp);

    let success_count = latencies.len() as u64;
    let mean = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<f64>() / latencies.len() as f64
    };

    LatencySummary {
        total_count,
        success_count,
        error_count: total_count - success_count,
        p50: percentile(&latencies, 0.50),
        p95: percentile(&latencies, 0.95),
        p99: percentile(&latencies, 0.99),
        min: latencies.first().copied().unwrap_or(0.0),
        max: latencies.last().copied().unwrap_or(0.0),
        mean,
        throughput: total_count as f64 / elapsed_secs.max(1.0),
    }
}

pub fn aggregate(samples: &[Sample], elapsed_secs: f64) -> AggregateMetrics {
    let mut grouped: BTreeMap<_, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        grouped.entry(sample.category).or_default().push(sample);
    }

    AggregateMetrics {
        overall: summarize(samples, elapsed_secs),
        by_category: grouped
            .into_iter()
            .map(|(category, group)| (category, summarize(group, elapsed_secs)))
            .collect(),
    }
}

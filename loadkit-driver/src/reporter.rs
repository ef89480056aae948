//! Periodic delivery of collected samples.
//!
//! A [`Reporter`] owns a [`Collector`] and drains it on a timer, when the buffer reaches
//! `max_buffer_size`, and once more on [`Reporter::stop`]. Each drained batch is handed to every
//! configured [`FlushSink`].
//!
//! Delivery is at-most-once: the buffer is swapped out before delivery starts, so a sample is
//! in exactly one batch, and a batch whose delivery fails is logged and dropped.

use async_trait::async_trait;
use futures::future::BoxFuture;
use loadkit_common::{AggregateMetrics, Clock, DeliveryError, OperationOutcome, ReportPayload, Sample, SystemClock};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collector::Collector;
use crate::context::MetricReporter;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub flush_interval: Duration,
    /// Buffer length that triggers an immediate background flush.
    pub max_buffer_size: usize,
    pub client_id: String,
    /// Log every recorded sample and every flush at debug level.
    pub debug: bool,
    /// When set, batches are POSTed here as JSON.
    pub endpoint: Option<String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            client_id: Uuid::new_v4().to_string(),
            debug: false,
            endpoint: None,
        }
    }
}

/// Destination for flushed batches.
#[async_trait]
pub trait FlushSink: Send + Sync {
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), DeliveryError>;
}

/// POSTs each payload as `application/json`.
pub struct HttpSink {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), http_client: reqwest::Client::new() }
    }
}

#[async_trait]
impl FlushSink for HttpSink {
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

pub type FlushCallback = Arc<dyn Fn(ReportPayload) -> BoxFuture<'static, Result<(), DeliveryError>> + Send + Sync>;

/// Host-supplied async callback as a sink.
pub struct CallbackSink(FlushCallback);

impl CallbackSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ReportPayload) -> BoxFuture<'static, Result<(), DeliveryError>> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }
}

#[async_trait]
impl FlushSink for CallbackSink {
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), DeliveryError> {
        (self.0)(payload.clone()).await
    }
}

pub type RecordObserver = Arc<dyn Fn(&Sample) + Send + Sync>;

struct Inner {
    config: ReporterConfig,
    collector: Collector,
    sinks: Vec<Arc<dyn FlushSink>>,
    on_record: Option<RecordObserver>,
    timer: Mutex<Option<Timer>>,
    /// Size-triggered flushes still delivering; `stop` waits for them.
    in_flight: Mutex<JoinSet<()>>,
    clock: Arc<dyn Clock>,
}

struct Timer {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

pub struct ReporterBuilder {
    config: ReporterConfig,
    sinks: Vec<Arc<dyn FlushSink>>,
    on_record: Option<RecordObserver>,
    clock: Arc<dyn Clock>,
}

impl ReporterBuilder {
    pub fn sink(mut self, sink: Arc<dyn FlushSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn on_record(mut self, observer: RecordObserver) -> Self {
        self.on_record = Some(observer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(mut self) -> Reporter {
        if let Some(endpoint) = &self.config.endpoint {
            self.sinks.push(Arc::new(HttpSink::new(endpoint.clone())));
        }
        Reporter {
            inner: Arc::new(Inner {
                collector: Collector::with_clock(Arc::clone(&self.clock)),
                config: self.config,
                sinks: self.sinks,
                on_record: self.on_record,
                timer: Mutex::new(None),
                in_flight: Mutex::new(JoinSet::new()),
                clock: self.clock,
            }),
        }
    }
}

/// Cheap to clone; clones share the buffer, sinks and timer.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<Inner>,
}

impl Reporter {
    pub fn builder(config: ReporterConfig) -> ReporterBuilder {
        ReporterBuilder { config, sinks: Vec::new(), on_record: None, clock: Arc::new(SystemClock) }
    }

    pub fn new(config: ReporterConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.inner.config
    }

    /// Samples waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.collector.count()
    }

    /// Aggregate over the samples waiting for the next flush.
    pub fn metrics(&self) -> AggregateMetrics {
        self.inner.collector.metrics()
    }

    /// Timestamp and buffer one outcome. Reaching `max_buffer_size` schedules a flush on the
    /// current runtime without waiting for it.
    pub fn record(&self, outcome: OperationOutcome) {
        let (sample, len) = self.inner.collector.record_outcome(outcome);
        if self.inner.config.debug {
            debug!(
                operation = %sample.operation_name,
                category = %sample.category,
                latency_ms = sample.latency_ms,
                success = sample.success,
                "sample recorded"
            );
        }
        if let Some(observer) = &self.inner.on_record {
            observer(&sample);
        }
        if len >= self.inner.config.max_buffer_size {
            self.schedule_flush();
        }
    }

    fn schedule_flush(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let reporter = self.clone();
                let mut in_flight = self.inner.in_flight.lock();
                while in_flight.try_join_next().is_some() {}
                in_flight.spawn_on(
                    async move {
                        reporter.flush().await;
                    },
                    &handle,
                );
            }
            Err(_) => warn!("no async runtime available, size-triggered flush skipped"),
        }
    }

    /// Drain the buffer and deliver it. Returns how many samples were drained; 0 means there
    /// was nothing to send and no sink was called.
    pub async fn flush(&self) -> usize {
        let (records, metrics) = self.inner.collector.drain();
        if records.is_empty() {
            return 0;
        }

        let payload = ReportPayload {
            client_id: self.inner.config.client_id.clone(),
            timestamp: self.inner.clock.unix_now_ms(),
            records,
            metrics,
        };
        let count = payload.records.len();

        for sink in &self.inner.sinks {
            if let Err(e) = sink.deliver(&payload).await {
                warn!(error = %e, records = count, "flush delivery failed, batch dropped");
            }
        }
        if self.inner.config.debug {
            debug!(records = count, "flushed");
        }
        count
    }

    /// Arm the flush timer. No-op if already armed.
    pub fn start(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.is_some() {
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.flush_interval;
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = signal.notified() => break,
                }
                match weak.upgrade() {
                    Some(inner) => {
                        Reporter { inner }.flush().await;
                    }
                    None => break,
                }
            }
        });
        *timer = Some(Timer { task, shutdown });
    }

    pub fn is_running(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    /// Disarm the timer and flush whatever is still buffered. Timer and size-triggered flushes
    /// already in progress are allowed to finish first, so every drained batch has been handed
    /// to the sinks when this returns.
    pub async fn stop(&self) -> usize {
        let timer = self.inner.timer.lock().take();
        if let Some(timer) = timer {
            timer.shutdown.notify_one();
            if let Err(e) = timer.task.await {
                warn!(error = %e, "flush timer task ended abnormally");
            }
        }

        let mut in_flight = std::mem::take(&mut *self.inner.in_flight.lock());
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "size-triggered flush ended abnormally");
            }
        }

        self.flush().await
    }
}

impl MetricReporter for Reporter {
    fn report(&self, outcome: OperationOutcome) {
        self.record(outcome);
    }
}

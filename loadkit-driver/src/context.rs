//! Capabilities handed to a behavior for one run.

use async_trait::async_trait;
use loadkit_client::{CachedStore, DataAccess};
use loadkit_common::{Category, OperationOutcome, StoreError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::collector::Collector;
use crate::prng::Prng;

/// Cooperative stop flag shared between the host and a running behavior.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire-and-forget; the behavior notices at its next check.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Yields instead of sleeping. For tests and flat-out runs.
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

/// Receives one outcome per completed operation.
pub trait MetricReporter: Send + Sync {
    fn report(&self, outcome: OperationOutcome);
}

impl MetricReporter for Collector {
    fn report(&self, outcome: OperationOutcome) {
        self.record_outcome(outcome);
    }
}

/// User-visible log output from a behavior.
pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);

    fn action(&self, name: &str, detail: &str) {
        self.log(&format!("[action] {name}: {detail}"));
    }

    fn result(&self, name: &str, detail: &str) {
        self.log(&format!("[result] {name}: {detail}"));
    }

    fn error(&self, name: &str, message: &str) {
        self.log(&format!("[error] {name}: {message}"));
    }

    fn metric(&self, name: &str, value: f64, unit: &str) {
        self.log(&format!("[metric] {name} = {value:.2}{unit}"));
    }
}

/// Forwards every line to `tracing`.
pub struct TracingLog {
    behavior: String,
}

impl TracingLog {
    pub fn new(behavior: impl Into<String>) -> Self {
        Self { behavior: behavior.into() }
    }
}

impl LogSink for TracingLog {
    fn log(&self, line: &str) {
        info!(behavior = %self.behavior, "{line}");
    }

    fn error(&self, name: &str, message: &str) {
        warn!(behavior = %self.behavior, operation = name, "{message}");
    }
}

/// Keeps the most recent lines for a UI to display, and forwards them to `tracing`.
pub struct BufferedLog {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    forward: TracingLog,
}

impl BufferedLog {
    pub fn new(behavior: impl Into<String>, capacity: usize) -> Self {
        Self { lines: Mutex::new(VecDeque::new()), capacity, forward: TracingLog::new(behavior) }
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        lines.push_back(line);
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }
}

impl LogSink for BufferedLog {
    fn log(&self, line: &str) {
        self.forward.log(line);
        self.push(line.to_string());
    }

    fn error(&self, name: &str, message: &str) {
        self.forward.error(name, message);
        self.push(format!("[error] {name}: {message}"));
    }
}

/// Which capability set the host builds a context with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Direct request/response reads; logs go to `tracing` only.
    Headless,
    /// Reads of `list` go through a refresh-on-demand snapshot; the last `log_capacity` log
    /// lines are retained for display.
    Interactive { cache_max_age: Duration, log_capacity: usize },
}

/// Everything a behavior may use during `init` and `run`. Built fresh per run.
pub struct BehaviorContext {
    pub prng: Prng,
    stop: StopSignal,
    log: Arc<dyn LogSink>,
    retained: Option<Arc<BufferedLog>>,
    sleeper: Arc<dyn Sleeper>,
    store: Arc<dyn DataAccess>,
    reporter: Option<Arc<dyn MetricReporter>>,
}

impl BehaviorContext {
    /// Context with direct store access and `tracing` logging.
    pub fn headless(
        behavior: &str,
        prng: Prng,
        store: Arc<dyn DataAccess>,
        stop: StopSignal,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            prng,
            stop,
            log: Arc::new(TracingLog::new(behavior)),
            retained: None,
            sleeper,
            store,
            reporter: None,
        }
    }

    /// Context whose list reads are served from snapshots no older than `cache_max_age`, keeping
    /// the last `log_capacity` log lines (see [`BehaviorContext::retained_log`]).
    pub fn interactive(
        behavior: &str,
        prng: Prng,
        store: Arc<dyn DataAccess>,
        stop: StopSignal,
        sleeper: Arc<dyn Sleeper>,
        cache_max_age: Duration,
        log_capacity: usize,
    ) -> Self {
        let log = Arc::new(BufferedLog::new(behavior, log_capacity));
        Self {
            prng,
            stop,
            log: log.clone(),
            retained: Some(log),
            sleeper,
            store: Arc::new(CachedStore::new(store, cache_max_age)),
            reporter: None,
        }
    }

    pub fn for_mode(
        mode: ContextMode,
        behavior: &str,
        prng: Prng,
        store: Arc<dyn DataAccess>,
        stop: StopSignal,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        match mode {
            ContextMode::Headless => Self::headless(behavior, prng, store, stop, sleeper),
            ContextMode::Interactive { cache_max_age, log_capacity } => {
                Self::interactive(behavior, prng, store, stop, sleeper, cache_max_age, log_capacity)
            }
        }
    }

    /// The line buffer of an interactive context; `None` when headless.
    pub fn retained_log(&self) -> Option<Arc<BufferedLog>> {
        self.retained.clone()
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn MetricReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn log(&self) -> &dyn LogSink {
        self.log.as_ref()
    }

    pub fn store(&self) -> Arc<dyn DataAccess> {
        Arc::clone(&self.store)
    }

    pub async fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration).await;
    }

    /// Sleep a PRNG-drawn `[min_ms, max_ms]` milliseconds.
    pub async fn sleep_jitter(&mut self, min_ms: u64, max_ms: u64) {
        let ms = if max_ms > min_ms {
            self.prng.int(min_ms as i64, max_ms as i64 + 1) as u64
        } else {
            min_ms
        };
        self.sleep(Duration::from_millis(ms)).await;
    }

    pub fn report(&self, outcome: OperationOutcome) {
        if let Some(reporter) = &self.reporter {
            reporter.report(outcome);
        }
    }

    /// Await `op`, time it, and report the outcome. A failure is logged and returned so the
    /// caller can carry on with its loop.
    pub async fn measure<T, F>(&self, category: Category, name: &str, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let result = op.await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        match &result {
            Ok(_) => self.report(OperationOutcome::success(category, name, latency_ms)),
            Err(e) => {
                let message = e.to_string();
                self.log.error(name, &message);
                self.report(OperationOutcome::failure(category, name, latency_ms, message));
            }
        }
        result
    }
}

//! Drives one behavior at a time through `init` and `run`.

use futures::FutureExt;
use loadkit_client::DataAccess;
use loadkit_common::{BehaviorConfig, ConfigError, RunError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::behavior::{Behavior, BehaviorRegistry};
use crate::context::{BehaviorContext, BufferedLog, ContextMode, MetricReporter, Sleeper, StopSignal, TokioSleeper};
use crate::prng::Prng;
use crate::reporter::Reporter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum RunState {
    NotStarted,
    Initializing,
    Running,
    Completed,
    Stopped,
    Failed(String),
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Initializing | RunState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Stopped | RunState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub behavior: Option<String>,
    pub seed: Option<u32>,
    pub state: RunState,
}

#[derive(Debug, Error, PartialEq)]
pub enum RunnerError {
    #[error("unknown behavior: {0}")]
    UnknownBehavior(String),

    #[error("behavior {0} is already running")]
    AlreadyRunning(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

pub struct RunnerOptions {
    pub mode: ContextMode,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { mode: ContextMode::Headless, sleeper: Arc::new(TokioSleeper) }
    }
}

/// Owns the registry, the store handle, the optional reporter and the state of the current run.
pub struct Runner {
    registry: Arc<BehaviorRegistry>,
    store: Arc<dyn DataAccess>,
    reporter: Option<Reporter>,
    options: RunnerOptions,
    status: Arc<watch::Sender<RunStatus>>,
    stop: Mutex<StopSignal>,
    log: Mutex<Option<Arc<BufferedLog>>>,
}

impl Runner {
    pub fn new(registry: BehaviorRegistry, store: Arc<dyn DataAccess>, options: RunnerOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            reporter: None,
            options,
            status: Arc::new(watch::Sender::new(RunStatus { behavior: None, seed: None, state: RunState::NotStarted })),
            stop: Mutex::new(StopSignal::new()),
            log: Mutex::new(None),
        }
    }

    /// Every run reports its samples here; the reporter is started with the run and stopped
    /// (with a final flush) when the run ends.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    /// Log lines retained by an interactive run; empty for headless runs.
    pub fn logs(&self) -> Vec<String> {
        self.log.lock().as_ref().map(|log| log.lines()).unwrap_or_default()
    }

    /// Validate `raw_config`, then spawn the behavior on the current runtime. A missing seed is
    /// derived from the clock; the one used is reported in the status.
    pub fn start(&self, name: &str, raw_config: &Value, seed: Option<u32>) -> Result<RunStatus, RunnerError> {
        let behavior = self
            .registry
            .get(name)
            .ok_or_else(|| RunnerError::UnknownBehavior(name.to_string()))?;
        let config = behavior.config_schema().validate(raw_config)?;
        let prng = seed.map(Prng::new).unwrap_or_else(Prng::from_time);
        let seed = prng.seed();

        let started = RunStatus { behavior: Some(name.to_string()), seed: Some(seed), state: RunState::Initializing };
        let stop = StopSignal::new();
        let mut busy_with = None;
        self.status.send_if_modified(|status| {
            if status.state.is_active() {
                busy_with = Some(status.behavior.clone().unwrap_or_default());
                return false;
            }
            // The new signal must be in place before any `stop` can observe the new state.
            *self.stop.lock() = stop.clone();
            *status = started.clone();
            true
        });
        if let Some(current) = busy_with {
            return Err(RunnerError::AlreadyRunning(current));
        }

        let ctx = self.build_context(name, prng, stop);
        info!(behavior = name, seed, config = %config.as_json(), "starting run");

        tokio::spawn(drive(behavior, ctx, config, Arc::clone(&self.status), self.reporter.clone()));
        Ok(started)
    }

    fn build_context(&self, name: &str, prng: Prng, stop: StopSignal) -> BehaviorContext {
        let ctx = BehaviorContext::for_mode(
            self.options.mode,
            name,
            prng,
            Arc::clone(&self.store),
            stop,
            Arc::clone(&self.options.sleeper),
        );
        *self.log.lock() = ctx.retained_log();
        match &self.reporter {
            Some(reporter) => ctx.with_reporter(Arc::new(reporter.clone()) as Arc<dyn MetricReporter>),
            None => ctx,
        }
    }

    /// Ask the current run to stop at its next check. Returns immediately.
    pub fn stop(&self) {
        self.stop.lock().request_stop();
    }

    /// Wait until no run is active and return the resulting state. Cancel-safe.
    pub async fn wait(&self) -> RunState {
        let mut rx = self.status.subscribe();
        let result = rx.wait_for(|status| !status.state.is_active()).await.map(|s| s.state.clone());
        result.unwrap_or_else(|_| self.status().state)
    }
}

async fn drive(
    behavior: Arc<dyn Behavior>,
    mut ctx: BehaviorContext,
    config: BehaviorConfig,
    status: Arc<watch::Sender<RunStatus>>,
    reporter: Option<Reporter>,
) {
    if let Some(reporter) = &reporter {
        reporter.start();
    }

    let phases = AssertUnwindSafe(run_phases(behavior.as_ref(), &mut ctx, &config, &status));
    let result = match phases.catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(RunError::Panicked(panic_message(panic.as_ref()))),
    };

    let state = match result {
        Ok(()) if ctx.should_stop() => RunState::Stopped,
        Ok(()) => RunState::Completed,
        Err(e) => {
            error!(behavior = behavior.name(), error = %e, "run failed");
            ctx.log().error(behavior.name(), &e.to_string());
            RunState::Failed(e.to_string())
        }
    };

    if let Some(reporter) = &reporter {
        reporter.stop().await;
    }

    info!(behavior = behavior.name(), state = ?state, "run finished");
    status.send_modify(|s| s.state = state);
}

async fn run_phases(
    behavior: &dyn Behavior,
    ctx: &mut BehaviorContext,
    config: &BehaviorConfig,
    status: &watch::Sender<RunStatus>,
) -> Result<(), RunError> {
    behavior.init(ctx, config).await?;
    if ctx.should_stop() {
        return Ok(());
    }
    status.send_modify(|s| s.state = RunState::Running);
    behavior.run(ctx, config).await
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use async_trait::async_trait;
use loadkit_client::{DataAccess, MemoryStore};
use loadkit_common::{BehaviorConfig, ConfigError, DeliveryError, ReportPayload, RunError};
use loadkit_driver::behavior::{Behavior, BehaviorRegistry};
use loadkit_driver::context::{BehaviorContext, ContextMode, NoSleep};
use loadkit_driver::reporter::{FlushSink, Reporter, ReporterConfig};
use loadkit_driver::runner::{RunState, Runner, RunnerError, RunnerOptions};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FailsIn(&'static str);

#[async_trait]
impl Behavior for FailsIn {
    fn name(&self) -> &'static str {
        "fails"
    }

    fn description(&self) -> &'static str {
        "fails in the named phase"
    }

    async fn init(&self, _ctx: &mut BehaviorContext, _config: &BehaviorConfig) -> Result<(), RunError> {
        if self.0 == "init" {
            return Err(RunError::Init("no connection".to_string()));
        }
        Ok(())
    }

    async fn run(&self, _ctx: &mut BehaviorContext, _config: &BehaviorConfig) -> Result<(), RunError> {
        Err(RunError::Run("lost the plot".to_string()))
    }
}

struct Panics;

#[async_trait]
impl Behavior for Panics {
    fn name(&self) -> &'static str {
        "panics"
    }

    fn description(&self) -> &'static str {
        "panics in run"
    }

    async fn run(&self, _ctx: &mut BehaviorContext, _config: &BehaviorConfig) -> Result<(), RunError> {
        panic!("kaboom");
    }
}

/// Waits in `init` until stopped; records whether `run` was ever entered.
struct SlowInit {
    ran: Arc<AtomicBool>,
}

#[async_trait]
impl Behavior for SlowInit {
    fn name(&self) -> &'static str {
        "slow-init"
    }

    fn description(&self) -> &'static str {
        "blocks in init until stopped"
    }

    async fn init(&self, ctx: &mut BehaviorContext, _config: &BehaviorConfig) -> Result<(), RunError> {
        while !ctx.should_stop() {
            ctx.sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }

    async fn run(&self, _ctx: &mut BehaviorContext, _config: &BehaviorConfig) -> Result<(), RunError> {
        self.ran.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    payloads: Mutex<Vec<ReportPayload>>,
}

#[async_trait]
impl FlushSink for RecordingSink {
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), DeliveryError> {
        self.payloads.lock().push(payload.clone());
        Ok(())
    }
}

fn options(mode: ContextMode) -> RunnerOptions {
    RunnerOptions { mode, sleeper: Arc::new(NoSleep) }
}

fn runner_with(registry: BehaviorRegistry) -> (Runner, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let runner = Runner::new(registry, store.clone() as Arc<dyn DataAccess>, options(ContextMode::Headless));
    (runner, store)
}

fn default_runner() -> (Runner, Arc<MemoryStore>) {
    runner_with(BehaviorRegistry::with_defaults())
}

#[tokio::test]
async fn test_initial_status() {
    let (runner, _) = default_runner();
    let status = runner.status();
    assert_eq!(status.state, RunState::NotStarted);
    assert_eq!(status.behavior, None);
    assert_eq!(runner.wait().await, RunState::NotStarted);
    assert!(runner.logs().is_empty());
}

#[tokio::test]
async fn test_run_to_completion() {
    let (runner, store) = default_runner();

    let started = runner.start("seeder", &json!({"count": 15, "batchSize": 5}), Some(7)).unwrap();
    assert_eq!(started.state, RunState::Initializing);
    assert_eq!(started.seed, Some(7));
    assert_eq!(started.behavior.as_deref(), Some("seeder"));

    assert_eq!(runner.wait().await, RunState::Completed);
    assert_eq!(store.count("items").await.unwrap(), 15);

    let status = runner.status();
    assert_eq!(status.state, RunState::Completed);
    assert_eq!(status.seed, Some(7));
}

#[tokio::test]
async fn test_missing_seed_is_generated_and_reported() {
    let (runner, _) = default_runner();
    let started = runner.start("seeder", &json!({"count": 1}), None).unwrap();
    assert!(started.seed.is_some());
    runner.wait().await;
    assert_eq!(runner.status().seed, started.seed);
}

#[tokio::test]
async fn test_stop_ends_an_open_ended_run() {
    let (runner, store) = default_runner();
    runner.start("writer", &json!({"iterations": 0}), Some(1)).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(runner.status().state.is_active());
    runner.stop();

    let state = tokio::time::timeout(Duration::from_secs(5), runner.wait()).await.unwrap();
    assert_eq!(state, RunState::Stopped);
    assert!(store.count("items").await.unwrap() > 0);
}

#[tokio::test]
async fn test_stop_right_after_start_is_honoured() {
    let (runner, store) = default_runner();
    runner.start("writer", &json!({"iterations": 0}), Some(1)).unwrap();
    runner.stop();

    let state = tokio::time::timeout(Duration::from_secs(5), runner.wait()).await.unwrap();
    assert_eq!(state, RunState::Stopped);
    assert_eq!(store.count("items").await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_from_another_thread_as_soon_as_run_is_visible() {
    for seed in 0..20 {
        let (runner, _) = default_runner();
        let runner = Arc::new(runner);
        let watcher = {
            let runner = Arc::clone(&runner);
            std::thread::spawn(move || {
                while !runner.status().state.is_active() {
                    std::thread::yield_now();
                }
                runner.stop();
            })
        };

        runner.start("writer", &json!({"iterations": 0}), Some(seed)).unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), runner.wait())
            .await
            .expect("stop request was lost");
        assert_eq!(state, RunState::Stopped);
        watcher.join().unwrap();
    }
}

#[tokio::test]
async fn test_stop_during_init_skips_run() {
    let ran = Arc::new(AtomicBool::new(false));
    let mut registry = BehaviorRegistry::new();
    registry.register(Arc::new(SlowInit { ran: Arc::clone(&ran) }));
    let (runner, _) = runner_with(registry);

    runner.start("slow-init", &Value::Null, Some(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(runner.status().state, RunState::Initializing);
    runner.stop();

    assert_eq!(runner.wait().await, RunState::Stopped);
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_run_error_fails_the_run() {
    let mut registry = BehaviorRegistry::new();
    registry.register(Arc::new(FailsIn("run")));
    let (runner, _) = runner_with(registry);

    runner.start("fails", &Value::Null, Some(1)).unwrap();
    assert_eq!(runner.wait().await, RunState::Failed("run failed: lost the plot".to_string()));
}

#[tokio::test]
async fn test_init_error_fails_the_run() {
    let mut registry = BehaviorRegistry::new();
    registry.register(Arc::new(FailsIn("init")));
    let (runner, _) = runner_with(registry);

    runner.start("fails", &Value::Null, Some(1)).unwrap();
    assert_eq!(runner.wait().await, RunState::Failed("init failed: no connection".to_string()));
}

#[tokio::test]
async fn test_panic_fails_the_run() {
    let mut registry = BehaviorRegistry::new();
    registry.register(Arc::new(Panics));
    let (runner, _) = runner_with(registry);

    runner.start("panics", &Value::Null, Some(1)).unwrap();
    assert_eq!(runner.wait().await, RunState::Failed("behavior panicked: kaboom".to_string()));
}

#[tokio::test]
async fn test_second_start_while_running_is_rejected() {
    let (runner, _) = default_runner();
    runner.start("writer", &json!({"iterations": 0}), Some(1)).unwrap();

    let err = runner.start("reader", &Value::Null, Some(2)).unwrap_err();
    assert_eq!(err, RunnerError::AlreadyRunning("writer".to_string()));
    assert_eq!(runner.status().behavior.as_deref(), Some("writer"));

    runner.stop();
    assert_eq!(runner.wait().await, RunState::Stopped);
}

#[tokio::test]
async fn test_runner_can_start_again_after_a_run() {
    let (runner, store) = default_runner();
    runner.start("seeder", &json!({"count": 3}), Some(1)).unwrap();
    runner.wait().await;
    runner.start("seeder", &json!({"count": 4}), Some(2)).unwrap();
    assert_eq!(runner.wait().await, RunState::Completed);
    assert_eq!(store.count("items").await.unwrap(), 7);
    assert_eq!(runner.status().seed, Some(2));
}

#[tokio::test]
async fn test_unknown_behavior_is_rejected() {
    let (runner, _) = default_runner();
    let err = runner.start("nope", &Value::Null, None).unwrap_err();
    assert_eq!(err, RunnerError::UnknownBehavior("nope".to_string()));
    assert_eq!(runner.status().state, RunState::NotStarted);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_starting() {
    let (runner, _) = default_runner();

    let err = runner.start("seeder", &json!({"count": 0}), None).unwrap_err();
    assert_eq!(
        err,
        RunnerError::InvalidConfig(ConfigError::BelowMin { field: "count".to_string(), value: 0.0, min: 1.0 })
    );

    let err = runner.start("seeder", &json!({"bogus": 1}), None).unwrap_err();
    assert_eq!(err, RunnerError::InvalidConfig(ConfigError::UnknownField("bogus".to_string())));
    assert_eq!(runner.status().state, RunState::NotStarted);
}

#[tokio::test]
async fn test_interactive_run_keeps_log_lines() {
    let store = Arc::new(MemoryStore::new());
    let runner = Runner::new(
        BehaviorRegistry::with_defaults(),
        store,
        options(ContextMode::Interactive { cache_max_age: Duration::from_millis(100), log_capacity: 10 }),
    );

    runner.start("seeder", &json!({"count": 5}), Some(1)).unwrap();
    runner.wait().await;

    assert_eq!(
        runner.logs(),
        vec!["[action] seeder: creating 5 documents in batches of 10", "[result] seeder: created 5 of 5"]
    );
}

#[tokio::test]
async fn test_failure_reason_reaches_interactive_log() {
    let mut registry = BehaviorRegistry::new();
    registry.register(Arc::new(FailsIn("run")));
    let runner = Runner::new(
        registry,
        Arc::new(MemoryStore::new()),
        options(ContextMode::Interactive { cache_max_age: Duration::from_millis(100), log_capacity: 10 }),
    );

    runner.start("fails", &Value::Null, Some(1)).unwrap();
    runner.wait().await;

    assert_eq!(runner.logs(), vec!["[error] fails: run failed: lost the plot"]);
}

#[tokio::test]
async fn test_reporter_is_flushed_when_run_ends() {
    let sink = Arc::new(RecordingSink::default());
    let reporter = Reporter::builder(ReporterConfig { flush_interval: Duration::from_secs(3_600), ..ReporterConfig::default() })
        .sink(sink.clone())
        .build();
    let (runner, _) = default_runner();
    let runner = runner.with_reporter(reporter.clone());

    runner.start("seeder", &json!({"count": 30, "batchSize": 10}), Some(1)).unwrap();
    runner.wait().await;

    let payloads = sink.payloads.lock();
    let records: usize = payloads.iter().map(|p| p.records.len()).sum();
    assert_eq!(records, 3);
    assert!(payloads.iter().flat_map(|p| &p.records).all(|r| r.operation_name == "batch-create"));
    assert!(!reporter.is_running());
    assert_eq!(reporter.pending(), 0);
}

#[test]
fn test_run_state_serialization() {
    assert_eq!(serde_json::to_value(RunState::Completed).unwrap(), json!({"state": "completed"}));
    assert_eq!(
        serde_json::to_value(RunState::Failed("boom".to_string())).unwrap(),
        json!({"state": "failed", "reason": "boom"})
    );
    assert!(RunState::Running.is_active());
    assert!(RunState::Stopped.is_terminal());
    assert!(!RunState::NotStarted.is_active());
    assert!(!RunState::NotStarted.is_terminal());
}

#[test]
fn test_runner_error_messages() {
    assert_eq!(RunnerError::UnknownBehavior("x".to_string()).to_string(), "unknown behavior: x");
    assert_eq!(RunnerError::AlreadyRunning("x".to_string()).to_string(), "behavior x is already running");
    assert_eq!(
        RunnerError::InvalidConfig(ConfigError::NotAnObject).to_string(),
        "invalid configuration: config must be a JSON object"
    );
}

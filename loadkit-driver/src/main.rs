use clap::Parser;
use loadkit_client::{DataAccess, HttpStore, MemoryStore, StoreConfig};
use loadkit_common::{AggregateMetrics, LatencySummary, Sample};
use loadkit_driver::behavior::BehaviorRegistry;
use loadkit_driver::collector::Collector;
use loadkit_driver::config::load_behavior_config;
use loadkit_driver::context::{ContextMode, TokioSleeper};
use loadkit_driver::reporter::{Reporter, ReporterConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BUFFER_SIZE};
use loadkit_driver::runner::{RunState, RunStatus, Runner, RunnerOptions};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

const INTERACTIVE_CACHE_MAX_AGE: Duration = Duration::from_secs(1);
const INTERACTIVE_LOG_CAPACITY: usize = 200;

#[derive(Parser)]
#[command(name = "loadkit", about = "Run a seeded workload against a document store and report latency")]
struct Args {
    /// Behavior to run (see --list)
    #[arg(long, required_unless_present = "list")]
    behavior: Option<String>,

    /// Print the registered behaviors and their config schemas as JSON, then exit
    #[arg(long)]
    list: bool,

    /// Base URL of a loadkit-server; an in-process store is used when omitted
    #[arg(long)]
    store_url: Option<String>,

    /// PRNG seed; derived from the clock when omitted
    #[arg(long)]
    seed: Option<u32>,

    /// JSON file holding the behavior config object
    #[arg(long)]
    config: Option<PathBuf>,

    /// Config override, key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Stop the run after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Endpoint the reporter POSTs sample batches to
    #[arg(long)]
    metrics_url: Option<String>,

    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL.as_millis() as u64)]
    flush_interval_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_BUFFER_SIZE)]
    max_buffer_size: usize,

    /// Client id attached to every batch; random when omitted
    #[arg(long)]
    client_id: Option<String>,

    /// Serve list reads from short-lived snapshots and keep the run log for display
    #[arg(long)]
    interactive: bool,

    /// Log every sample and flush
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();
    let registry = BehaviorRegistry::with_defaults();

    if args.list {
        match serde_json::to_string_pretty(&registry.manifest()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to render manifest: {e}");
                process::exit(3);
            }
        }
        return;
    }

    let Some(behavior) = args.behavior.clone() else {
        eprintln!("--behavior is required. Valid values: {}", registry.names().join(", "));
        process::exit(3);
    };

    let raw_config = load_behavior_config(args.config.as_deref(), &args.overrides).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(3);
    });

    let store: Arc<dyn DataAccess> = match &args.store_url {
        Some(url) => Arc::new(HttpStore::new(StoreConfig { base_url: url.clone() })),
        None => Arc::new(MemoryStore::new()),
    };

    let session = Arc::new(Collector::new());
    let observed = Arc::clone(&session);
    let mut reporter_config = ReporterConfig {
        flush_interval: Duration::from_millis(args.flush_interval_ms.max(1)),
        max_buffer_size: args.max_buffer_size.max(1),
        debug: args.debug,
        endpoint: args.metrics_url.clone(),
        ..ReporterConfig::default()
    };
    if let Some(client_id) = &args.client_id {
        reporter_config.client_id = client_id.clone();
    }
    let reporter = Reporter::builder(reporter_config)
        .on_record(Arc::new(move |sample: &Sample| observed.record(sample.clone())))
        .build();

    let mode = if args.interactive {
        ContextMode::Interactive { cache_max_age: INTERACTIVE_CACHE_MAX_AGE, log_capacity: INTERACTIVE_LOG_CAPACITY }
    } else {
        ContextMode::Headless
    };
    let runner = Runner::new(registry, store, RunnerOptions { mode, sleeper: Arc::new(TokioSleeper) })
        .with_reporter(reporter);

    let started_at = Instant::now();
    let status = runner.start(&behavior, &raw_config, args.seed).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(3);
    });

    println!(
        "Running {} with seed {}",
        behavior,
        status.seed.map(|s| s.to_string()).unwrap_or_default()
    );

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = runner.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Stop requested, waiting for the current operation");
            runner.stop();
        }
        _ = deadline => runner.stop(),
    }
    let state = runner.wait().await;

    print_report(&runner.status(), started_at.elapsed(), &session.metrics());

    if args.interactive {
        for line in runner.logs() {
            println!("  {line}");
        }
    }

    process::exit(match state {
        RunState::Failed(_) => 1,
        _ => 0,
    });
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}

fn print_report(status: &RunStatus, elapsed: Duration, metrics: &AggregateMetrics) {
    let state = match &status.state {
        RunState::Failed(reason) => format!("failed ({reason})"),
        other => format!("{other:?}").to_lowercase(),
    };

    println!();
    println!("LoadKit Run Results");
    println!("===================");
    println!("Behavior:              {}", status.behavior.as_deref().unwrap_or("-"));
    println!("Seed:                  {}", status.seed.map(|s| s.to_string()).unwrap_or_default());
    println!("State:                 {state}");
    println!("Duration:              {:.1} s", elapsed.as_secs_f64());
    println!();
    print_summary(&metrics.overall);

    for (category, summary) in &metrics.by_category {
        println!();
        println!("[{category}]");
        print_summary(summary);
    }
}

fn print_summary(summary: &LatencySummary) {
    println!("Operations:            {}", format_thousands(summary.total_count));
    println!(
        "Errors:                {}    ({:.2}%)",
        format_thousands(summary.error_count),
        summary.error_rate() * 100.0
    );
    println!("Throughput:            {:.1} ops/s", summary.throughput);
    println!("P50 latency:           {:.1} ms", summary.p50);
    println!("P95 latency:           {:.1} ms", summary.p95);
    println!("P99 latency:           {:.1} ms", summary.p99);
}

fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}

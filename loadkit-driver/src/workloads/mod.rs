//! Built-in workloads and the operations they share.
//!
//! | Workload | Policy                                                             |
//! |----------|--------------------------------------------------------------------|
//! | seeder   | bulk creation in batches until `count` documents were attempted    |
//! | reader   | uniform over list-recent / get-by-id / count / find-by-status      |
//! | writer   | create with `createProbability`, otherwise update a created doc    |
//! | mixed    | 70% reads (list-recent / get-by-id / count), 30% create / update   |

use loadkit_client::Fields;
use loadkit_common::{BehaviorConfig, Category, ConfigField, ConfigSchema, RunError, DEFAULT_COLLECTION};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::context::BehaviorContext;
use crate::prng::Prng;

mod mixed;
mod reader;
mod seeder;
mod writer;

pub use mixed::MixedWorkload;
pub use reader::Reader;
pub use seeder::Seeder;
pub use writer::Writer;

pub const STATUSES: [&str; 3] = ["active", "pending", "archived"];
const TAGS: [&str; 6] = ["alpha", "beta", "gamma", "delta", "edge", "bulk"];

/// Documents fetched by a list-recent read.
const LIST_LIMIT: usize = 20;
/// Upper bound on ids a workload remembers locally.
const MAX_TRACKED_IDS: usize = 500;
/// Length of the alphanumeric `ref` code on generated documents.
const REF_LEN: usize = 8;

/// Build the fields of one synthetic document.
pub fn random_item(prng: &mut Prng, seq: u64) -> Result<Fields, RunError> {
    let status = *prng.pick(&STATUSES)?;
    let mut tags = TAGS.to_vec();
    let keep = prng.int(1, 4) as usize;
    prng.shuffle(tags.as_mut_slice());
    tags.truncate(keep);

    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::from(format!("item-{seq}-{:04}", prng.int(0, 10_000))));
    fields.insert("status".to_string(), Value::from(status));
    fields.insert("priority".to_string(), Value::from(prng.int(1, 6)));
    fields.insert("score".to_string(), Value::from(round2(prng.float(0.0, 100.0))));
    fields.insert("tags".to_string(), Value::from(tags));
    let reference: String = (0..REF_LEN).map(|_| char::from(prng.sample(Alphanumeric))).collect();
    fields.insert("ref".to_string(), Value::from(reference));
    Ok(fields)
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Iteration count, jitter bounds and target collection shared by the looping workloads.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    /// 0 runs until stopped.
    pub iterations: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub collection: String,
}

impl LoopSettings {
    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "iterations",
                ConfigField::number(0.0).at_least(0.0).describe("Operations to perform; 0 runs until stopped"),
            )
            .field(
                "minDelayMs",
                ConfigField::number(50.0).range(0.0, 60_000.0).describe("Shortest pause between operations"),
            )
            .field(
                "maxDelayMs",
                ConfigField::number(250.0).range(0.0, 60_000.0).describe("Longest pause between operations"),
            )
            .field("collection", ConfigField::string(DEFAULT_COLLECTION).describe("Target collection"))
    }

    pub fn from_config(config: &BehaviorConfig) -> Self {
        let min_delay_ms = config.count("minDelayMs").unwrap_or(50);
        Self {
            iterations: config.count("iterations").unwrap_or(0),
            min_delay_ms,
            max_delay_ms: config.count("maxDelayMs").unwrap_or(250).max(min_delay_ms),
            collection: config.string("collection").unwrap_or(DEFAULT_COLLECTION).to_string(),
        }
    }

    pub fn keep_going(&self, ctx: &BehaviorContext, done: u64) -> bool {
        !ctx.should_stop() && (self.iterations == 0 || done < self.iterations)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOp {
    ListRecent,
    GetById,
    Count,
    FindByStatus,
}

impl ReadOp {
    pub fn as_name(&self) -> &'static str {
        match self {
            ReadOp::ListRecent => "list-recent",
            ReadOp::GetById => "get-by-id",
            ReadOp::Count => "count",
            ReadOp::FindByStatus => "find-by-status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

impl WriteOp {
    pub fn as_name(&self) -> &'static str {
        match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
        }
    }
}

fn remember(ids: &mut Vec<String>, new: impl IntoIterator<Item = String>) {
    ids.extend(new);
    if ids.len() > MAX_TRACKED_IDS {
        let excess = ids.len() - MAX_TRACKED_IDS;
        ids.drain(..excess);
    }
}

/// Perform one read. `known_ids` feeds get-by-id and is refreshed by list-recent; with no ids
/// known yet, get-by-id falls back to list-recent.
pub(crate) async fn perform_read(
    ctx: &mut BehaviorContext,
    collection: &str,
    op: ReadOp,
    known_ids: &mut Vec<String>,
) -> Result<(), RunError> {
    let store = ctx.store();
    let op = if op == ReadOp::GetById && known_ids.is_empty() { ReadOp::ListRecent } else { op };

    match op {
        ReadOp::ListRecent => {
            if let Ok(docs) = ctx.measure(Category::Query, op.as_name(), store.list(collection, LIST_LIMIT)).await {
                known_ids.clear();
                remember(known_ids, docs.into_iter().map(|d| d.id));
            }
        }
        ReadOp::GetById => {
            let id = ctx.prng.pick(known_ids.as_slice())?.clone();
            if let Ok(None) = ctx.measure(Category::Query, op.as_name(), store.get(collection, &id)).await {
                ctx.log().result(op.as_name(), &format!("{id} no longer exists"));
            }
        }
        ReadOp::Count => {
            let _ = ctx.measure(Category::Query, op.as_name(), store.count(collection)).await;
        }
        ReadOp::FindByStatus => {
            let status = Value::from(*ctx.prng.pick(&STATUSES)?);
            let _ = ctx
                .measure(Category::Query, op.as_name(), store.find_by(collection, "status", &status, LIST_LIMIT))
                .await;
        }
    }
    Ok(())
}

/// Perform one write. Updates target an id from `created`; with none yet, a create is issued.
pub(crate) async fn perform_write(
    ctx: &mut BehaviorContext,
    collection: &str,
    op: WriteOp,
    created: &mut Vec<String>,
    seq: u64,
) -> Result<(), RunError> {
    let store = ctx.store();
    let op = if op == WriteOp::Update && created.is_empty() { WriteOp::Create } else { op };

    match op {
        WriteOp::Create => {
            let fields = random_item(&mut ctx.prng, seq)?;
            if let Ok(id) = ctx.measure(Category::Mutation, op.as_name(), store.create(collection, fields)).await {
                remember(created, [id]);
            }
        }
        WriteOp::Update => {
            let id = ctx.prng.pick(created.as_slice())?.clone();
            let mut fields = Fields::new();
            fields.insert("status".to_string(), Value::from(*ctx.prng.pick(&STATUSES)?));
            fields.insert("score".to_string(), Value::from(round2(ctx.prng.float(0.0, 100.0))));
            let _ = ctx.measure(Category::Mutation, op.as_name(), store.update(collection, &id, fields)).await;
        }
    }
    Ok(())
}

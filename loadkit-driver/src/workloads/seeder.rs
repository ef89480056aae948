use async_trait::async_trait;
use loadkit_common::{BehaviorConfig, Category, ConfigField, ConfigSchema, RunError, DEFAULT_COLLECTION};

use super::random_item;
use crate::behavior::Behavior;
use crate::context::BehaviorContext;

/// Bulk-creates `count` documents, `batchSize` per request.
///
/// A failed batch is reported and skipped, not retried. A stop request abandons the batch being
/// assembled; batches already written stay in place.
pub struct Seeder;

#[async_trait]
impl Behavior for Seeder {
    fn name(&self) -> &'static str {
        "seeder"
    }

    fn description(&self) -> &'static str {
        "Bulk-create documents in batches until the target count is reached"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field("count", ConfigField::number(100.0).at_least(1.0).describe("Documents to create"))
            .field("batchSize", ConfigField::number(10.0).range(1.0, 1_000.0).describe("Documents per request"))
            .field("collection", ConfigField::string(DEFAULT_COLLECTION).describe("Target collection"))
    }

    async fn run(&self, ctx: &mut BehaviorContext, config: &BehaviorConfig) -> Result<(), RunError> {
        let total = config.count("count").unwrap_or(100);
        let batch_size = config.count("batchSize").unwrap_or(10).max(1);
        let collection = config.string("collection").unwrap_or(DEFAULT_COLLECTION).to_string();
        let store = ctx.store();

        ctx.log().action(self.name(), &format!("creating {total} documents in batches of {batch_size}"));

        let mut attempted = 0u64;
        let mut created = 0u64;
        'batches: while attempted < total {
            if ctx.should_stop() {
                break;
            }

            let size = batch_size.min(total - attempted);
            let mut docs = Vec::with_capacity(size as usize);
            for i in 0..size {
                if ctx.should_stop() {
                    break 'batches;
                }
                docs.push(random_item(&mut ctx.prng, attempted + i)?);
            }

            if let Ok(ids) = ctx.measure(Category::Mutation, "batch-create", store.create_batch(&collection, docs)).await {
                created += ids.len() as u64;
            }
            attempted += size;
        }

        if ctx.should_stop() {
            ctx.log().result(self.name(), &format!("stopped after creating {created} of {total}"));
        } else {
            ctx.log().result(self.name(), &format!("created {created} of {total}"));
        }
        Ok(())
    }
}

use async_trait::async_trait;
use loadkit_common::{BehaviorConfig, Category, ConfigSchema, RunError};

use super::{perform_read, LoopSettings, ReadOp};
use crate::behavior::Behavior;
use crate::context::BehaviorContext;

const READ_OPS: [ReadOp; 4] = [ReadOp::ListRecent, ReadOp::GetById, ReadOp::Count, ReadOp::FindByStatus];

/// Read-only load: each iteration picks one query shape uniformly.
pub struct Reader;

#[async_trait]
impl Behavior for Reader {
    fn name(&self) -> &'static str {
        "reader"
    }

    fn description(&self) -> &'static str {
        "Read-only load cycling uniformly among list, get, count and filtered queries"
    }

    fn config_schema(&self) -> ConfigSchema {
        LoopSettings::schema()
    }

    /// Warm-up: one count so the first measured iteration doesn't pay for connection setup.
    async fn init(&self, ctx: &mut BehaviorContext, config: &BehaviorConfig) -> Result<(), RunError> {
        if ctx.should_stop() {
            return Ok(());
        }
        let settings = LoopSettings::from_config(config);
        let store = ctx.store();
        if let Ok(n) = ctx.measure(Category::Query, "count", store.count(&settings.collection)).await {
            ctx.log().result("warm-up", &format!("{n} documents in {}", settings.collection));
        }
        Ok(())
    }

    async fn run(&self, ctx: &mut BehaviorContext, config: &BehaviorConfig) -> Result<(), RunError> {
        let settings = LoopSettings::from_config(config);
        let mut known_ids = Vec::new();
        let mut done = 0u64;

        while settings.keep_going(ctx, done) {
            let op = *ctx.prng.pick(&READ_OPS)?;
            perform_read(ctx, &settings.collection, op, &mut known_ids).await?;
            done += 1;
            if settings.keep_going(ctx, done) {
                ctx.sleep_jitter(settings.min_delay_ms, settings.max_delay_ms).await;
            }
        }

        ctx.log().result(self.name(), &format!("{done} reads"));
        Ok(())
    }
}

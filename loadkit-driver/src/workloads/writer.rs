use async_trait::async_trait;
use loadkit_common::{BehaviorConfig, ConfigField, ConfigSchema, RunError};

use super::{perform_write, LoopSettings, WriteOp};
use crate::behavior::Behavior;
use crate::context::BehaviorContext;

pub const DEFAULT_CREATE_PROBABILITY: f64 = 0.6;

/// Write-heavy load: creates with `createProbability`, otherwise updates a document this run
/// created. Ids are tracked locally so updates never depend on listing the store.
pub struct Writer;

#[async_trait]
impl Behavior for Writer {
    fn name(&self) -> &'static str {
        "writer"
    }

    fn description(&self) -> &'static str {
        "Write-heavy load splitting creates and updates of locally created documents"
    }

    fn config_schema(&self) -> ConfigSchema {
        LoopSettings::schema().field(
            "createProbability",
            ConfigField::number(DEFAULT_CREATE_PROBABILITY)
                .range(0.0, 1.0)
                .describe("Chance that an iteration creates rather than updates"),
        )
    }

    async fn run(&self, ctx: &mut BehaviorContext, config: &BehaviorConfig) -> Result<(), RunError> {
        let settings = LoopSettings::from_config(config);
        let create_probability = config.number("createProbability").unwrap_or(DEFAULT_CREATE_PROBABILITY);
        let mut created = Vec::new();
        let mut done = 0u64;

        while settings.keep_going(ctx, done) {
            let op = if ctx.prng.chance(create_probability) { WriteOp::Create } else { WriteOp::Update };
            perform_write(ctx, &settings.collection, op, &mut created, done).await?;
            done += 1;
            if settings.keep_going(ctx, done) {
                ctx.sleep_jitter(settings.min_delay_ms, settings.max_delay_ms).await;
            }
        }

        ctx.log().result(self.name(), &format!("{done} writes, {} documents tracked", created.len()));
        Ok(())
    }
}

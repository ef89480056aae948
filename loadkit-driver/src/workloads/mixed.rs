use async_trait::async_trait;
use loadkit_common::{BehaviorConfig, ConfigSchema, RunError};

use super::{perform_read, perform_write, LoopSettings, ReadOp, WriteOp};
use crate::behavior::Behavior;
use crate::context::BehaviorContext;

pub const READ_RATIO: f64 = 0.7;

const READ_OPS: [ReadOp; 3] = [ReadOp::ListRecent, ReadOp::GetById, ReadOp::Count];
const WRITE_OPS: [WriteOp; 2] = [WriteOp::Create, WriteOp::Update];

/// 70/30 read/write split, then a uniform choice within the chosen side.
pub struct MixedWorkload;

#[async_trait]
impl Behavior for MixedWorkload {
    fn name(&self) -> &'static str {
        "mixed"
    }

    fn description(&self) -> &'static str {
        "Mixed load: 70% reads and 30% writes"
    }

    fn config_schema(&self) -> ConfigSchema {
        LoopSettings::schema()
    }

    async fn run(&self, ctx: &mut BehaviorContext, config: &BehaviorConfig) -> Result<(), RunError> {
        let settings = LoopSettings::from_config(config);
        let mut known_ids = Vec::new();
        let mut created = Vec::new();
        let (mut reads, mut writes) = (0u64, 0u64);

        while settings.keep_going(ctx, reads + writes) {
            if ctx.prng.chance(READ_RATIO) {
                let op = *ctx.prng.pick(&READ_OPS)?;
                perform_read(ctx, &settings.collection, op, &mut known_ids).await?;
                reads += 1;
            } else {
                let op = *ctx.prng.pick(&WRITE_OPS)?;
                perform_write(ctx, &settings.collection, op, &mut created, writes).await?;
                writes += 1;
            }
            if settings.keep_going(ctx, reads + writes) {
                ctx.sleep_jitter(settings.min_delay_ms, settings.max_delay_ms).await;
            }
        }

        ctx.log().result(self.name(), &format!("{reads} reads, {writes} writes"));
        Ok(())
    }
}

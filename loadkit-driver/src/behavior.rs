use async_trait::async_trait;
use loadkit_common::{BehaviorConfig, ConfigSchema, RunError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::BehaviorContext;
use crate::workloads::{MixedWorkload, Reader, Seeder, Writer};

/// A named workload with a one-shot `init` phase and a main `run` loop.
///
/// Implementations hold no per-run state: everything mutable lives in locals of `run` and in
/// the context. Both phases must poll [`BehaviorContext::should_stop`] at their suspension
/// points and return `Ok(())` promptly once it is set. Per-operation failures are reported and
/// swallowed; only an `Err` escaping a phase fails the run.
#[async_trait]
pub trait Behavior: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }

    async fn init(&self, _ctx: &mut BehaviorContext, _config: &BehaviorConfig) -> Result<(), RunError> {
        Ok(())
    }

    async fn run(&self, ctx: &mut BehaviorContext, config: &BehaviorConfig) -> Result<(), RunError>;
}

/// Manifest entry describing a registered behavior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorDescriptor {
    pub name: String,
    pub description: String,
    pub config: ConfigSchema,
}

#[derive(Default)]
pub struct BehaviorRegistry {
    behaviors: BTreeMap<String, Arc<dyn Behavior>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in workloads.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Seeder));
        registry.register(Arc::new(Reader));
        registry.register(Arc::new(Writer));
        registry.register(Arc::new(MixedWorkload));
        registry
    }

    /// Replaces any behavior already registered under the same name.
    pub fn register(&mut self, behavior: Arc<dyn Behavior>) {
        self.behaviors.insert(behavior.name().to_string(), behavior);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Behavior>> {
        self.behaviors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.behaviors.keys().map(String::as_str).collect()
    }

    pub fn manifest(&self) -> Vec<BehaviorDescriptor> {
        self.behaviors
            .values()
            .map(|b| BehaviorDescriptor {
                name: b.name().to_string(),
                description: b.description().to_string(),
                config: b.config_schema(),
            })
            .collect()
    }
}

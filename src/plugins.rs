//! Plugin registry and the reference analysis engine.
//!
//! A resource configuration may restrict which analytics run on its jobs by
//! name. The registry maps stable string identifiers to constructors and is
//! filtered with a plain set-membership check; the whitelist wins when a
//! resource configures both lists.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::config::ResourceConfig;
use crate::error::{Result, SummarizeError};
use crate::job::Job;
use crate::pipeline::runner::{AnalysisEngine, EngineFactory};

/// One summarization analytic, computing metrics for a single job.
pub trait Plugin: Send {
    fn name(&self) -> &'static str;

    /// Returns false when the plugin could not produce a result for this job.
    fn process(&mut self, job: &Job) -> bool;

    fn result(&self) -> Value;
}

pub type PluginCtor = fn() -> Box<dyn Plugin>;

#[derive(Clone, Default)]
pub struct PluginRegistry {
    entries: BTreeMap<&'static str, PluginCtor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in analytics.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("archive_coverage", || Box::<ArchiveCoverage>::default());
        registry.register("job_overview", || Box::<JobOverview>::default());
        registry
    }

    pub fn register(&mut self, name: &'static str, ctor: PluginCtor) {
        self.entries.insert(name, ctor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Constructors allowed for a resource. The whitelist takes precedence
    /// over the blacklist when both are configured.
    pub fn filtered(&self, resource: &ResourceConfig) -> Vec<PluginCtor> {
        if let Some(whitelist) = &resource.plugin_whitelist {
            self.entries
                .iter()
                .filter(|(name, _)| whitelist.iter().any(|allowed| allowed == *name))
                .map(|(_, ctor)| *ctor)
                .collect()
        } else if let Some(blacklist) = &resource.plugin_blacklist {
            self.entries
                .iter()
                .filter(|(name, _)| !blacklist.iter().any(|denied| denied == *name))
                .map(|(_, ctor)| *ctor)
                .collect()
        } else {
            self.entries.values().copied().collect()
        }
    }
}

/// Builds a [`PluginSummarizer`] per job from the resource-filtered plugin
/// set.
pub struct PluginEngineFactory {
    ctors: Vec<PluginCtor>,
}

impl PluginEngineFactory {
    pub fn new(registry: &PluginRegistry, resource: &ResourceConfig) -> Self {
        Self {
            ctors: registry.filtered(resource),
        }
    }

    pub fn plugin_count(&self) -> usize {
        self.ctors.len()
    }
}

impl EngineFactory for PluginEngineFactory {
    fn build(&self, job: &Job) -> Box<dyn AnalysisEngine> {
        Box::new(PluginSummarizer {
            job: job.clone(),
            plugins: self.ctors.iter().map(|ctor| ctor()).collect(),
            processed: false,
            failures: 0,
        })
    }
}

/// Reference analysis engine: runs every plugin over the job and judges the
/// summary good enough when the plugin set is non-empty and every plugin
/// produced a result.
pub struct PluginSummarizer {
    job: Job,
    plugins: Vec<Box<dyn Plugin>>,
    processed: bool,
    failures: usize,
}

impl AnalysisEngine for PluginSummarizer {
    fn process(&mut self) -> Result<()> {
        for plugin in &mut self.plugins {
            let name = plugin.name();
            // A panicking plugin fails this job's analysis, not the worker.
            let produced = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                plugin.process(&self.job)
            }))
            .map_err(|_| SummarizeError::Analysis(format!("plugin {name} panicked")))?;
            if !produced {
                tracing::debug!(
                    job_id = %self.job.local_job_id,
                    plugin = name,
                    "plugin produced no result"
                );
                self.failures += 1;
            }
        }
        self.processed = true;
        Ok(())
    }

    fn good_enough(&self) -> bool {
        self.processed && !self.plugins.is_empty() && self.failures == 0
    }

    fn metrics(&self) -> Value {
        let mut metrics = Map::new();
        for plugin in &self.plugins {
            metrics.insert(plugin.name().to_string(), plugin.result());
        }
        Value::Object(metrics)
    }
}

/// Basic shape of the job: node count, duration, node-seconds.
#[derive(Default)]
struct JobOverview {
    summary: Option<Value>,
}

impl Plugin for JobOverview {
    fn name(&self) -> &'static str {
        "job_overview"
    }

    fn process(&mut self, job: &Job) -> bool {
        self.summary = Some(json!({
            "nodecount": job.nodecount,
            "walltime_secs": job.walltime_secs,
            "node_seconds": job.nodecount as f64 * job.walltime_secs,
        }));
        true
    }

    fn result(&self) -> Value {
        self.summary.clone().unwrap_or(Value::Null)
    }
}

/// Which raw archives were available for the job.
#[derive(Default)]
struct ArchiveCoverage {
    coverage: Option<Value>,
}

impl Plugin for ArchiveCoverage {
    fn name(&self) -> &'static str {
        "archive_coverage"
    }

    fn process(&mut self, job: &Job) -> bool {
        self.coverage = Some(json!({
            "any_archives": job.has_any_archives(),
            "enough_archives": job.has_enough_raw_archives(),
        }));
        job.has_any_archives()
    }

    fn result(&self) -> Value {
        self.coverage.clone().unwrap_or(Value::Null)
    }
}

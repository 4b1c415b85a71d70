//! Build orchestration.
//!
//! Runs task sequences derived from the registry, one task at a time.

use std::{sync::Arc, time::Instant};

use kiln_core::{BuildMode, Config};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    registry::{self, RegistryError, TaskRegistry},
    task::{Task, TaskContext, TaskError, TaskReport},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A task failed; the sequence stopped there.
    #[error("task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: TaskError,
    },

    /// Invalid task declarations.
    #[error("invalid task graph: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Tasks run, in order.
    pub tasks: Vec<&'static str>,

    /// Files written under the build root.
    pub files_written: usize,

    /// Non-fatal diagnostics.
    pub warnings: usize,

    /// Image cache hits.
    pub cache_hits: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs task sequences.
#[derive(Debug)]
pub struct Pipeline {
    registry: TaskRegistry,
}

impl Pipeline {
    /// Create the standard pipeline for `config`.
    pub fn new(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self::from_registry(TaskRegistry::standard(config)?))
    }

    /// Create a pipeline over an existing registry.
    #[must_use]
    pub fn from_registry(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    /// The task registry.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run every task in dependency order.
    pub fn build(&self, mode: BuildMode) -> Result<BuildStats> {
        if self.registry.is_empty() {
            warn!("no tasks declared");
        }
        let sequence = self.registry.sequence()?;
        info!(mode = %mode, tasks = self.registry.len(), "starting build");
        debug!(order = ?registry::names(&sequence), "task order");
        let stats = self.run_sequence(&sequence, mode)?;
        info!(
            tasks = stats.tasks.len(),
            files = stats.files_written,
            warnings = stats.warnings,
            duration_ms = stats.duration_ms,
            "build complete"
        );
        Ok(stats)
    }

    /// Run only the named tasks, in dependency order.
    pub fn run_tasks(&self, names: &[&str], mode: BuildMode) -> Result<BuildStats> {
        let sequence = self.registry.sequence_for(names)?;
        debug!(order = ?registry::names(&sequence), "task order");
        self.run_sequence(&sequence, mode)
    }

    fn run_sequence(&self, tasks: &[Arc<dyn Task>], mode: BuildMode) -> Result<BuildStats> {
        let start = Instant::now();
        let ctx = TaskContext::new(mode);
        let mut stats = BuildStats::default();
        let mut total = TaskReport::new();

        for task in tasks {
            let name = task.name();
            let task_start = Instant::now();
            info!(task = name, "starting");

            let report = task.run(&ctx).map_err(|source| {
                error!(task = name, error = %source, "task failed");
                PipelineError::Task {
                    task: name.to_string(),
                    source,
                }
            })?;

            info!(
                task = name,
                files = report.written.len(),
                warnings = report.warnings.len(),
                duration_ms = task_start.elapsed().as_millis() as u64,
                "finished"
            );
            stats.tasks.push(name);
            total.merge(report);
        }

        stats.files_written = total.written.len();
        stats.warnings = total.warnings.len();
        stats.cache_hits = total.cache_hits;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }
}

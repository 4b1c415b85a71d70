//! Task registry.
//!
//! Holds the declared tasks and the dependency graph between them, and
//! derives the sequences the pipeline runs.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};

use kiln_core::Config;
use thiserror::Error;

use crate::{
    assets::CopyTask,
    fonts::FontsTask,
    graph::{GraphError, TaskGraph},
    images::ImagesTask,
    output::CleanTask,
    pages::{LintTemplatesTask, RenderTemplatesTask},
    scripts::ScriptsTask,
    sprite::SpriteTask,
    styles::StylesTask,
    task::Task,
};

/// Registry construction errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid dependency declaration.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A task writes outside the build root.
    #[error("task '{task}' writes outside the build root: {}", .path.display())]
    OutsideBuildRoot { task: String, path: PathBuf },
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Declared tasks and their dependency order.
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Arc<dyn Task>>,
    graph: TaskGraph,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

/// Builder collecting task declarations.
pub struct RegistryBuilder {
    build_root: PathBuf,
    declared: Vec<(Arc<dyn Task>, Vec<&'static str>)>,
}

impl RegistryBuilder {
    /// Declare `task`, running after each of `depends_on`.
    #[must_use]
    pub fn task(mut self, task: Arc<dyn Task>, depends_on: &[&'static str]) -> Self {
        self.declared.push((task, depends_on.to_vec()));
        self
    }

    /// Validate the declarations and build the registry.
    pub fn build(self) -> Result<TaskRegistry> {
        let mut graph = TaskGraph::new();
        let mut tasks = HashMap::new();

        for (task, _) in &self.declared {
            let name = task.name();
            graph.add_task(name)?;
            for output in task.outputs() {
                if !output.starts_with(&self.build_root) {
                    return Err(RegistryError::OutsideBuildRoot {
                        task: name.to_string(),
                        path: output,
                    });
                }
            }
            tasks.insert(name, Arc::clone(task));
        }

        for (task, deps) in &self.declared {
            for dep in deps {
                graph.add_dependency(task.name(), dep)?;
            }
        }

        // Surfaces cycles before anything runs.
        graph.order()?;

        Ok(TaskRegistry { tasks, graph })
    }
}

impl TaskRegistry {
    /// Start declaring tasks whose outputs must lie under `build_root`.
    #[must_use]
    pub fn builder(build_root: impl Into<PathBuf>) -> RegistryBuilder {
        RegistryBuilder {
            build_root: build_root.into(),
            declared: Vec::new(),
        }
    }

    /// The standard pipeline for `config`.
    pub fn standard(config: &Config) -> Result<Self> {
        let src = config.paths.src.as_path();
        let build = config.paths.build.as_path();
        let cache = config.images.cache.then(|| config.paths.cache.join("img"));

        Self::builder(build)
            .task(Arc::new(CleanTask::new(build)), &[])
            .task(Arc::new(CopyTask::standard(src, build)), &["clean"])
            .task(Arc::new(FontsTask::new(src, build)), &["clean"])
            .task(
                Arc::new(LintTemplatesTask::new(src, config.lint.templates.clone())),
                &["clean"],
            )
            .task(
                Arc::new(
                    RenderTemplatesTask::new(src, build, config.templates.locals.clone())
                        .with_bem(config.templates.bem)
                        .with_notify(config.server.notify),
                ),
                &["lint-templates"],
            )
            .task(
                Arc::new(StylesTask::new(src, build, config.styles.browsers.clone())),
                &["clean"],
            )
            .task(
                Arc::new(ScriptsTask::new(src, build, config.lint.scripts.clone())),
                &["clean"],
            )
            .task(
                Arc::new(ImagesTask::new(src, build, cache, &config.images)),
                &["clean"],
            )
            .task(Arc::new(SpriteTask::new(src, build)), &["clean"])
            .build()
    }

    /// Look up a task by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Task>> {
        self.tasks.get(name)
    }

    /// Number of declared tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Every task in dependency order.
    pub fn sequence(&self) -> Result<Vec<Arc<dyn Task>>> {
        Ok(self.resolve(self.graph.order()?))
    }

    /// The named tasks in dependency order. Unlisted dependencies are not
    /// pulled in.
    pub fn sequence_for(&self, names: &[&str]) -> Result<Vec<Arc<dyn Task>>> {
        Ok(self.resolve(self.graph.order_subset(names)?))
    }

    fn resolve(&self, order: Vec<&'static str>) -> Vec<Arc<dyn Task>> {
        order
            .into_iter()
            .filter_map(|name| self.tasks.get(name).cloned())
            .collect()
    }
}

/// Names of `tasks`, for logging.
#[must_use]
pub fn names(tasks: &[Arc<dyn Task>]) -> Vec<&'static str> {
    tasks.iter().map(|t| t.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskContext, TaskReport};

    struct Named(&'static str, PathBuf);

    impl Task for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn outputs(&self) -> Vec<PathBuf> {
            vec![self.1.clone()]
        }

        fn run(&self, _ctx: &TaskContext) -> crate::task::Result<TaskReport> {
            Ok(TaskReport::new())
        }
    }

    fn named(name: &'static str) -> Arc<dyn Task> {
        Arc::new(Named(name, PathBuf::from("build").join(name)))
    }

    #[test]
    fn test_standard_sequence() {
        let registry = TaskRegistry::standard(&Config::default()).unwrap();
        assert_eq!(registry.len(), 9);
        assert_eq!(
            names(&registry.sequence().unwrap()),
            vec![
                "clean",
                "copy",
                "fonts",
                "lint-templates",
                "render-templates",
                "styles",
                "scripts",
                "images",
                "sprite",
            ]
        );
        assert_eq!(
            names(&registry.sequence_for(&["styles", "copy"]).unwrap()),
            vec!["copy", "styles"]
        );
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = TaskRegistry::builder("build")
            .task(named("styles"), &["sass"])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Graph(GraphError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = TaskRegistry::builder("build")
            .task(named("a"), &["b"])
            .task(named("b"), &["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::Graph(GraphError::Cycle(_))));
    }

    #[test]
    fn test_outputs_must_stay_in_build_root() {
        let err = TaskRegistry::builder("build")
            .task(Arc::new(Named("leak", PathBuf::from("src/out"))), &[])
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::OutsideBuildRoot { .. }));
    }

    #[test]
    fn test_unknown_subset_name() {
        let registry = TaskRegistry::builder("build")
            .task(named("copy"), &[])
            .build()
            .unwrap();
        assert!(registry.sequence_for(&["nope"]).is_err());
        assert!(registry.get("copy").is_some());
    }
}

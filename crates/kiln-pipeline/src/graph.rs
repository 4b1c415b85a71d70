//! Task dependency graph.
//!
//! Tasks declare what they depend on; execution order is derived by a
//! topological sort. Among tasks whose dependencies are satisfied, the one
//! declared first runs first, so the derived order is deterministic.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use petgraph::{
    Direction,
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};
use thiserror::Error;

/// Graph construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Two tasks share a name.
    #[error("task declared twice: {0}")]
    DuplicateTask(String),

    /// A dependency or subset names a task that was never declared.
    #[error("unknown task '{name}' referenced by '{referenced_by}'")]
    UnknownTask { name: String, referenced_by: String },

    /// Dependencies form a cycle through this task.
    #[error("dependency cycle through task '{0}'")]
    Cycle(String),
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Directed acyclic graph of task names. Edges point from a dependency to the
/// task that depends on it.
#[derive(Debug, Default)]
pub struct TaskGraph {
    graph: DiGraph<&'static str, ()>,
    by_name: HashMap<&'static str, NodeIndex>,
}

impl TaskGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task. Declaration order breaks ties in [`TaskGraph::order`].
    pub fn add_task(&mut self, name: &'static str) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(GraphError::DuplicateTask(name.to_string()));
        }
        let id = self.graph.add_node(name);
        self.by_name.insert(name, id);
        Ok(())
    }

    /// Declare that `task` must run after `depends_on`.
    pub fn add_dependency(&mut self, task: &'static str, depends_on: &str) -> Result<()> {
        let to = self.index(task, task)?;
        let from = self.index(depends_on, task)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// All tasks in dependency order.
    pub fn order(&self) -> Result<Vec<&'static str>> {
        if let Err(cycle) = toposort(&self.graph, None) {
            let name = self.graph[cycle.node_id()];
            tracing::warn!(task = name, "cycle detected in task graph");
            return Err(GraphError::Cycle(name.to_string()));
        }

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|id| self.graph.neighbors_directed(id, Direction::Incoming).count())
            .collect();

        // Node indices follow declaration order.
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|id| in_degree[id.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(self.graph[id]);
            for next in self.graph.neighbors_directed(id, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        Ok(order)
    }

    /// The given tasks only, in the relative order [`TaskGraph::order`]
    /// assigns them. Dependencies outside the subset are not added.
    pub fn order_subset(&self, tasks: &[&str]) -> Result<Vec<&'static str>> {
        for task in tasks {
            self.index(task, "subset")?;
        }
        Ok(self
            .order()?
            .into_iter()
            .filter(|name| tasks.contains(name))
            .collect())
    }

    fn index(&self, name: &str, referenced_by: &str) -> Result<NodeIndex> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask {
                name: name.to_string(),
                referenced_by: referenced_by.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_graph() -> TaskGraph {
        let mut graph = TaskGraph::new();
        for name in [
            "clean",
            "copy",
            "fonts",
            "lint-templates",
            "render-templates",
            "styles",
            "scripts",
            "images",
            "sprite",
        ] {
            graph.add_task(name).unwrap();
        }
        for name in ["copy", "fonts", "lint-templates", "styles", "scripts", "images", "sprite"] {
            graph.add_dependency(name, "clean").unwrap();
        }
        graph
            .add_dependency("render-templates", "lint-templates")
            .unwrap();
        graph
    }

    #[test]
    fn test_order_follows_declaration_when_unconstrained() {
        let order = pipeline_graph().order().unwrap();
        assert_eq!(
            order,
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
    }

    #[test]
    fn test_dependency_overrides_declaration_order() {
        let mut graph = TaskGraph::new();
        graph.add_task("render").unwrap();
        graph.add_task("lint").unwrap();
        graph.add_dependency("render", "lint").unwrap();
        assert_eq!(graph.order().unwrap(), vec!["lint", "render"]);
    }

    #[test]
    fn test_order_subset_keeps_relative_order() {
        let graph = pipeline_graph();
        assert_eq!(
            graph.order_subset(&["styles", "copy"]).unwrap(),
            vec!["copy", "styles"]
        );
        assert_eq!(
            graph
                .order_subset(&["render-templates", "lint-templates"])
                .unwrap(),
            vec!["lint-templates", "render-templates"]
        );
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = TaskGraph::new();
        graph.add_task("a").unwrap();
        graph.add_task("b").unwrap();
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "a").unwrap();
        assert!(matches!(graph.order(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = TaskGraph::new();
        graph.add_task("styles").unwrap();
        let err = graph.add_dependency("styles", "sass").unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownTask {
                name: "sass".to_string(),
                referenced_by: "styles".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_task() {
        let mut graph = TaskGraph::new();
        graph.add_task("copy").unwrap();
        assert_eq!(
            graph.add_task("copy"),
            Err(GraphError::DuplicateTask("copy".to_string()))
        );
    }
}

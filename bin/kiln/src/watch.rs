//! Watch bindings and their coordinator.
//!
//! A binding maps a set of source globs to the tasks that rebuild them and
//! the reload they end with. Each binding owns a queue drained by one
//! long-lived tokio task, so runs of a binding never overlap; an event that
//! arrives mid-run queues a single follow-up run and further events coalesce
//! into it.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use kiln_core::BuildMode;
use kiln_pipeline::{Pipeline, SourceSet};
use tokio::sync::{
    broadcast,
    mpsc::{self, error::TrySendError},
};
use tracing::{debug, error, info, warn};

use crate::server::{ReloadMessage, ServerState};

/// Receives the reload a binding ends with.
pub trait Reload: Send + Sync + 'static {
    /// Push `message` to connected clients.
    fn reload(&self, message: ReloadMessage);
}

impl Reload for ServerState {
    fn reload(&self, message: ReloadMessage) {
        self.send(message);
    }
}

/// A watch binding.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    /// Binding name, for logs.
    pub name: &'static str,
    /// Files that trigger the binding.
    pub sources: SourceSet,
    /// Tasks to run; ordered by the pipeline's dependency graph.
    pub tasks: Vec<&'static str>,
    /// Reload sent after every task succeeded.
    pub reload: ReloadMessage,
}

impl WatchBinding {
    /// Create a binding over globs relative to `src_root`.
    pub fn new(
        name: &'static str,
        src_root: &Path,
        patterns: &[&str],
        tasks: &[&'static str],
        reload: ReloadMessage,
    ) -> Self {
        Self {
            name,
            sources: SourceSet::new(src_root, patterns),
            tasks: tasks.to_vec(),
            reload,
        }
    }
}

/// The standard bindings for sources under `src_root`.
#[must_use]
pub fn standard_bindings(src_root: &Path) -> Vec<WatchBinding> {
    let full = ReloadMessage::Reload;

    vec![
        WatchBinding::new("fonts", src_root, &["fonts/**/*"], &["fonts"], full),
        WatchBinding::new(
            "templates",
            src_root,
            &["html/**/*.pug"],
            &["lint-templates", "render-templates"],
            full,
        ),
        WatchBinding::new(
            "styles",
            src_root,
            &["css/**/*.scss"],
            &["copy", "styles"],
            ReloadMessage::CssReload,
        ),
        WatchBinding::new("files", src_root, &["files/**/*"], &["copy"], full),
        WatchBinding::new(
            "scripts",
            src_root,
            &["js/*.js"],
            &["copy", "scripts"],
            full,
        ),
        WatchBinding::new(
            "images",
            src_root,
            &["img/**/*.{gif,png,jpg,jpeg,ico,svg}"],
            &["images", "sprite"],
            full,
        ),
    ]
}

struct Trigger {
    name: &'static str,
    sources: SourceSet,
    tx: mpsc::Sender<()>,
}

/// Result of one binding run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Binding that ran.
    pub binding: &'static str,
    /// Files written, or the failure message.
    pub result: Result<usize, String>,
    /// Wall time of the run.
    pub duration_ms: u64,
}

/// Routes changed paths to bindings and runs them.
pub struct Coordinator {
    triggers: Vec<Trigger>,
    outcomes: broadcast::Sender<RunOutcome>,
}

impl Coordinator {
    /// Spawn one runner per binding on the current tokio runtime.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        bindings: Vec<WatchBinding>,
        reloader: Arc<dyn Reload>,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(32);
        let triggers = bindings
            .into_iter()
            .map(|binding| {
                for task in &binding.tasks {
                    if pipeline.registry().get(task).is_none() {
                        warn!(
                            binding = binding.name,
                            task,
                            "binding names an undeclared task"
                        );
                    }
                }

                // Capacity 1: at most one queued follow-up run.
                let (tx, rx) = mpsc::channel(1);
                tokio::spawn(run_binding(
                    Runner {
                        name: binding.name,
                        tasks: binding.tasks,
                        reload: binding.reload,
                        pipeline: Arc::clone(&pipeline),
                        reloader: Arc::clone(&reloader),
                        outcomes: outcomes.clone(),
                    },
                    rx,
                ));
                Trigger {
                    name: binding.name,
                    sources: binding.sources,
                    tx,
                }
            })
            .collect();

        Self { triggers, outcomes }
    }

    /// Receive the outcome of every run that finishes from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunOutcome> {
        self.outcomes.subscribe()
    }

    /// Trigger every binding matching any of `paths`, each at most once.
    /// Returns the names of the triggered bindings.
    pub fn dispatch(&self, paths: &[PathBuf]) -> Vec<&'static str> {
        let mut triggered = Vec::new();
        for trigger in &self.triggers {
            if !paths.iter().any(|p| trigger.sources.matches(p)) {
                continue;
            }
            match trigger.tx.try_send(()) {
                Ok(()) => debug!(binding = trigger.name, "queued rebuild"),
                Err(TrySendError::Full(())) => {
                    debug!(binding = trigger.name, "rebuild already queued");
                }
                Err(TrySendError::Closed(())) => {
                    warn!(binding = trigger.name, "binding runner stopped");
                    continue;
                }
            }
            triggered.push(trigger.name);
        }
        triggered
    }
}

struct Runner {
    name: &'static str,
    tasks: Vec<&'static str>,
    reload: ReloadMessage,
    pipeline: Arc<Pipeline>,
    reloader: Arc<dyn Reload>,
    outcomes: broadcast::Sender<RunOutcome>,
}

async fn run_binding(runner: Runner, mut rx: mpsc::Receiver<()>) {
    let name = runner.name;
    while rx.recv().await.is_some() {
        let start = Instant::now();
        info!(binding = name, "rebuilding");

        let pipeline = Arc::clone(&runner.pipeline);
        let names = runner.tasks.clone();
        let result =
            tokio::task::spawn_blocking(move || pipeline.run_tasks(&names, BuildMode::Develop))
                .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match result {
            Ok(Ok(stats)) => {
                info!(
                    binding = name,
                    files = stats.files_written,
                    duration_ms,
                    "rebuilt"
                );
                runner.reloader.reload(runner.reload);
                Ok(stats.files_written)
            }
            Ok(Err(e)) => {
                error!(binding = name, error = %e, "rebuild failed");
                Err(e.to_string())
            }
            Err(e) => {
                error!(binding = name, error = %e, "rebuild panicked");
                Err(e.to_string())
            }
        };

        // No subscribers is fine.
        let _ = runner.outcomes.send(RunOutcome {
            binding: name,
            result,
            duration_ms,
        });
    }
}

//! Start command - development server with watch and live reload

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use color_eyre::eyre::{Result, WrapErr};
use kiln_core::BuildMode;
use kiln_pipeline::Pipeline;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::{broadcast, mpsc};

use super::{build::print_build_stats, load_config};
use crate::{
    server::{self, ServerState},
    watch::{Coordinator, RunOutcome, standard_bindings},
};

/// Run the start command.
///
/// Builds once in develop mode, then serves the build root and rebuilds the
/// affected bindings whenever sources change.
pub async fn run(config_path: &Path, port: Option<u16>, open: Option<bool>) -> Result<()> {
    tracing::info!(?config_path, ?port, ?open, "Starting development server");

    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(open) = open {
        config.server.open = open;
    }

    let pipeline = Arc::new(
        Pipeline::new(&config).wrap_err("Failed to set up the build pipeline")?,
    );

    // Initial build; a failure is reported and the server still starts.
    let initial = Arc::clone(&pipeline);
    match tokio::task::spawn_blocking(move || initial.build(BuildMode::Develop))
        .await
        .wrap_err("Initial build panicked")?
    {
        Ok(stats) => print_build_stats(&stats, &config.paths.build),
        Err(e) => {
            tracing::error!(error = %e, "initial build failed");
            eprintln!("  ✗ Initial build failed: {e}");
        }
    }

    let state = Arc::new(ServerState::new());
    let coordinator = Coordinator::spawn(
        Arc::clone(&pipeline),
        standard_bindings(&config.paths.src),
        state.clone(),
    );

    let mut outcomes = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(RunOutcome {
                    binding,
                    result: Ok(files),
                    duration_ms,
                }) => println!("  ✓ {binding} rebuilt {files} files in {duration_ms}ms"),
                Ok(RunOutcome {
                    binding,
                    result: Err(e),
                    ..
                }) => eprintln!("  ✗ {binding}: {e}"),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Debounced watcher on the source tree
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
    let mut debouncer = new_debouncer(
        Duration::from_millis(config.server.debounce_ms),
        move |res: DebounceEventResult| match res {
            Ok(events) => {
                let paths = events.into_iter().map(|event| event.path).collect();
                let _ = tx.send(paths);
            }
            Err(e) => tracing::warn!(error = ?e, "watch error"),
        },
    )
    .wrap_err("Failed to create file watcher")?;

    debouncer
        .watcher()
        .watch(&config.paths.src, RecursiveMode::Recursive)
        .wrap_err_with(|| format!("Failed to watch {}", config.paths.src.display()))?;
    tracing::debug!(src = %config.paths.src.display(), "Watching source directory");

    tokio::spawn(async move {
        while let Some(paths) = rx.recv().await {
            let triggered = coordinator.dispatch(&paths);
            if !triggered.is_empty() {
                println!("  File change detected, rebuilding {}", triggered.join(", "));
            }
        }
    });

    // Keep watcher alive
    let _debouncer = debouncer;

    server::serve(&config.paths.build, state, &config.server).await
}

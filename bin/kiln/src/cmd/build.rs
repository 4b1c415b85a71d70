//! Build command - runs every task once in build mode

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use kiln_core::BuildMode;
use kiln_pipeline::{BuildStats, Pipeline};

use super::load_config;

/// Run the build command.
///
/// Fails on the first task that fails; its outputs and those of later tasks
/// are not written.
pub fn run(config_path: &Path) -> Result<()> {
    tracing::info!(?config_path, "Starting build");

    let config = load_config(config_path)?;
    tracing::debug!(?config, "Loaded configuration");

    let pipeline = Pipeline::new(&config).wrap_err("Failed to set up the build pipeline")?;
    let stats = pipeline.build(BuildMode::Build).wrap_err("Build failed")?;

    print_build_stats(&stats, &config.paths.build);
    tracing::info!(?stats, "Build completed successfully");

    Ok(())
}

/// Print build statistics in a user-friendly format.
pub(crate) fn print_build_stats(stats: &BuildStats, output: &Path) {
    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Tasks:      {}", stats.tasks.len());
    println!("  Files:      {}", stats.files_written);
    println!("  Warnings:   {}", stats.warnings);
    println!("  Cache hits: {}", stats.cache_hits);
    println!();
    println!("  Duration:   {}ms", stats.duration_ms);
    println!("  Output:     {}", output.display());
    println!();
}

//! Kiln CLI Library
//!
//! Commands, development server and watch coordinator behind the `kiln`
//! binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, start)
//! - [`server`] - Embedded development server with live reload
//! - [`watch`] - Watch bindings and their coordinator
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! kiln::cmd::build::run(Path::new("kiln.toml")).unwrap();
//! ```

pub mod cmd;
pub mod server;
pub mod watch;

// Re-export core types for convenience
pub use kiln_core::{BuildMode, Config};
pub use kiln_pipeline::{BuildStats, Pipeline};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

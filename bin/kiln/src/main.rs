//! Kiln CLI
//!
//! Front-end asset builder with a live reload development server.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for Kiln.
#[derive(Parser)]
#[command(
    name = "kiln",
    version,
    about = "Build front-end assets and serve them with live reload"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "kiln.toml")]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build every asset once for production
    Build,
    /// Build, then serve and rebuild on changes until Ctrl+C
    Start {
        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Open browser automatically
        #[arg(long, conflicts_with = "no_open")]
        open: bool,
        /// Do not open the browser
        #[arg(long)]
        no_open: bool,
    },
}

/// `--open` / `--no-open` as an override of `server.open`.
fn open_override(open: bool, no_open: bool) -> Option<bool> {
    match (open, no_open) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    kiln::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build => {
            kiln::cmd::build::run(&cli.config)?;
        }
        Commands::Start {
            port,
            open,
            no_open,
        } => {
            kiln::cmd::start::run(&cli.config, port, open_override(open, no_open)).await?;
        }
    }

    Ok(())
}

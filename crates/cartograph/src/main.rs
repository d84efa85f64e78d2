//! Cartograph launcher.
//!
//! `serve` runs the job-processing core (worker pool + control plane);
//! the other subcommands are one-shot operations against the same
//! database.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use cartograph_logging::LogConfig;

mod cli;
mod config;
mod providers;

#[derive(Parser, Debug)]
#[command(name = "cartograph", about = "UI-exploration test-management backend")]
struct Cli {
    /// Path to config.toml (default: ~/.cartograph/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror the full log filter to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker pool and control plane
    Serve,
    /// Job queue operations
    #[command(subcommand)]
    Job(cli::job::JobCommand),
    /// Procedure draft/commit operations
    #[command(subcommand)]
    Procedure(cli::procedure::ProcedureCommand),
    /// Project and endpoint management
    #[command(subcommand)]
    Catalog(cli::catalog::CatalogCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = cartograph_logging::init_logging(LogConfig {
        app_name: "cartograph",
        verbose: cli.verbose,
        filter: config.log_filter.as_deref(),
    }) {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }

    let outcome = match cli.command {
        Command::Serve => cli::serve::run(&config).await,
        Command::Job(command) => cli::job::run(command, &config).await,
        Command::Procedure(command) => cli::procedure::run(command, &config).await,
        Command::Catalog(command) => cli::catalog::run(command, &config).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

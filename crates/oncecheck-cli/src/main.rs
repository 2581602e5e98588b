//! oncecheck command-line runner.
//!
//! Runs the exactly-once harness against the in-process host runtime.
//!
//! # Quick Start
//!
//! ```bash
//! # Small local run with one injected failure
//! oncecheck run --units 16 --messages 2000 --seed 7
//!
//! # Show the effective configuration
//! oncecheck config
//! ```

mod commands;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use oncecheck_harness::HarnessError;

/// oncecheck - exactly-once verification harness.
#[derive(Parser)]
#[command(name = "oncecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Generate, crash, recover, and verify against the local runtime.
    Run(RunArgs),

    /// Print the effective configuration as TOML.
    Config {
        /// Directory holding oncecheck.toml.
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

/// Options of `oncecheck run`. Flags override every configuration source.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Directory holding oncecheck.toml.
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Number of units.
    #[arg(long)]
    pub units: Option<u32>,

    /// Number of command trees to generate.
    #[arg(long)]
    pub messages: Option<u64>,

    /// Maximum command tree depth.
    #[arg(long)]
    pub depth: Option<u32>,

    /// Failure budget across restarts.
    #[arg(long)]
    pub max_failures: Option<u32>,

    /// Seed for a reproducible run.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Delivered trees between checkpoints.
    #[arg(long, default_value = "100")]
    pub checkpoint_every: u64,

    /// Verification sweeps before stopping.
    #[arg(long, default_value = "2")]
    pub sweeps: u64,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    let result = match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run(args) => commands::run::run(&args),
        Commands::Config { project_dir } => commands::config::show(&project_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style::error("error:"));
            exit_code(&err)
        }
    }
}

/// 2 for a detected inconsistency, 3 for an injected failure nobody
/// recovered from, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<HarnessError>() {
        Some(HarnessError::ConsistencyViolation(_)) => ExitCode::from(2),
        Some(HarnessError::InjectedFailure { .. }) => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

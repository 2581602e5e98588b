//! Local harness run.

use std::time::Instant;

use anyhow::{Context, Result};
use oncecheck_config::{ConfigLoader, HarnessConfig};
use oncecheck_harness::{LocalRuntime, LocalRuntimeConfig, RunReport};

use crate::RunArgs;
use crate::style::{self, colors::SemanticStyle};

/// Runs the harness end to end and prints the report.
pub fn run(args: &RunArgs) -> Result<()> {
    let loaded = ConfigLoader::new()
        .with_project_dir(&args.project_dir)
        .load()
        .context("Failed to load configuration")?;
    let config = apply_overrides(loaded, args);
    config.validate().context("Invalid command-line override")?;

    let runtime_config = LocalRuntimeConfig {
        checkpoint_every: args.checkpoint_every,
        sweeps: args.sweeps,
    };

    if !args.json {
        println!(
            "Running {} commands over {} units (seed: {})...",
            config.message_count.to_string().header(),
            config.number_of_units.to_string().header(),
            config
                .seed
                .map_or_else(|| "random".to_string(), |seed| seed.to_string())
                .code()
        );
    }

    let started = Instant::now();
    let mut runtime = LocalRuntime::new(config, runtime_config)?;
    let report = runtime.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, started.elapsed().as_secs_f64());
    }
    Ok(())
}

fn apply_overrides(mut config: HarnessConfig, args: &RunArgs) -> HarnessConfig {
    if let Some(units) = args.units {
        config.number_of_units = units;
    }
    if let Some(messages) = args.messages {
        config.message_count = messages;
    }
    if let Some(depth) = args.depth {
        config.command_depth = depth;
    }
    if let Some(max_failures) = args.max_failures {
        config.max_failures = max_failures;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config
}

fn print_report(report: &RunReport, elapsed_secs: f64) {
    println!();
    println!(
        "{} {} units verified over {} sweeps",
        style::success("✓"),
        report.units.to_string().success(),
        report.sweeps
    );
    println!("  Commands:        {}/{}", report.cursor, report.planned);
    println!("  Deliveries:      {}", report.deliveries);
    println!("  Checkpoints:     {}", report.checkpoints);
    println!(
        "  Failures:        {} injected, {} restarts",
        report.failures_injected, report.restarts
    );
    println!("  Expected total:  {}", report.expected_total);
    println!("  Egress records:  {}", report.egress_records);
    println!("  Time:            {elapsed_secs:.2}s");
}

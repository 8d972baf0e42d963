//! Tranche scenario simulator.
//!
//! Loads a scenario file describing a reward pool, its work units, and a
//! timed list of actions, replays it against the reward engine, and prints
//! the resulting pool state.

mod runner;
mod scenario;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use runner::{Report, Simulation};
use scenario::Scenario;

/// Replay a reward-pool scenario against the Tranche engine.
#[derive(Parser, Debug)]
#[command(
    name = "tranche-sim",
    version,
    about = "Replay reward-pool scenarios against the Tranche engine"
)]
struct Args {
    /// Scenario file (TOML, JSON, or YAML)
    scenario: PathBuf,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Exit with an error if any step's outcome differs from the scenario
    #[arg(long)]
    strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    info!("Tranche simulator v{}", env!("CARGO_PKG_VERSION"));
    let scenario = Scenario::load(&args.scenario)?;
    info!(path = %args.scenario.display(), "scenario loaded");

    let report = Simulation::new(&scenario)?.run(&scenario);

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }

    let unexpected = report.unexpected().count();
    if args.strict && unexpected > 0 {
        bail!("{unexpected} step(s) did not behave as the scenario expected");
    }
    if !report.reconciles {
        bail!("pool books do not reconcile with the held balance");
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!("Steps");
    for step in &report.steps {
        let mark = match (step.ok, step.expected) {
            (true, true) => "ok",
            (false, true) => "rejected",
            (true, false) => "UNEXPECTED ok",
            (false, false) => "UNEXPECTED error",
        };
        println!("  t={:<8} {:<18} {:<18} {}", step.at, step.action, mark, step.detail);
    }

    let pool = &report.pool;
    println!();
    println!("Pool");
    println!("  phase:        {:?}", pool.phase);
    println!("  total funded: {}", pool.funding.total_funded);
    println!("  unallocated:  {}", pool.funding.unallocated);
    println!("  paid out:     {}", pool.funding.paid_out);
    println!("  forwarded:    {}", pool.funding.forwarded);
    println!("  claimed:      {} units", pool.claimed_units);
    println!("  reconciles:   {}", report.reconciles);

    println!();
    println!("Intervals");
    for r in &pool.intervals {
        println!(
            "  #{:<4} units={:<4} allocated={:<12} per_unit={}",
            r.index, r.unit_count, r.allocated_amount, r.reward_per_unit
        );
    }

    println!();
    println!("Balances");
    for (name, amount) in &report.balances {
        println!("  {name:<16} {amount}");
    }
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    // Logs go to stderr so `--json` output stays parseable.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

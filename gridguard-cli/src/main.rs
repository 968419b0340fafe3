//! Command-line front end: validate a configuration or run a simulation
//! and print the report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gridguard_sim::config::SimConfig;
use gridguard_sim::feed::{CsvFeed, RandomWalkFeed, TickFeed};
use gridguard_sim::runner::{RunReport, SimRunner};

#[derive(Parser)]
#[command(name = "gridguard", about = "Capital-preservation engine simulator", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulation and print the resulting report.
    Run {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Replay ticks from a CSV file (time,bid,ask) instead of the
        /// seeded random walk.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Override the random-walk seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Override the tick count.
        #[arg(long)]
        ticks: Option<usize>,

        /// Emit the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Check a configuration file and report the first problem found.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<SimConfig> {
    match path {
        Some(path) => SimConfig::from_toml_path(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(SimConfig::default()),
    }
}

fn run(
    config: Option<PathBuf>,
    csv: Option<PathBuf>,
    seed: Option<u64>,
    ticks: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut cfg = load_config(config.as_ref())?;
    if let Some(seed) = seed {
        cfg.seed = seed;
    }
    if let Some(ticks) = ticks {
        cfg.ticks = ticks;
    }

    let mut feed: Box<dyn TickFeed> = match csv {
        Some(path) => {
            Box::new(CsvFeed::from_path(&path).with_context(|| format!("replaying {}", path.display()))?)
        }
        None => Box::new(RandomWalkFeed::new(
            cfg.seed,
            cfg.start_price,
            cfg.spread_points,
            cfg.step_points,
            cfg.instrument.point,
            cfg.start_time,
            cfg.tick_interval_secs,
            cfg.ticks,
        )),
    };

    let mut runner = SimRunner::new(cfg).context("initializing engine")?;
    let report = runner.run(feed.as_mut());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("run      {}", &report.run_id[..16]);
    println!("ticks    {}", report.ticks);
    println!(
        "equity   {:.2} (balance {:.2}, max drawdown {:.2}%)",
        report.final_equity, report.final_balance, report.max_dd_pct
    );
    println!(
        "breakers hard={} daily={} hedge={} emergency={}",
        report.hard_stop_trips, report.daily_trips, report.hedge_locks, report.emergency_trips
    );
    println!("state    {}", report.final_state);
    for t in &report.transitions {
        println!("  {} {} -> {} ({})", t.at.format("%m-%d %H:%M:%S"), t.from, t.to, t.reason);
    }
}

fn validate(config: &PathBuf) -> Result<()> {
    let cfg = SimConfig::from_toml_path(config)
        .with_context(|| format!("loading {}", config.display()))?;
    cfg.guard.validate().context("engine configuration")?;
    cfg.instrument.build().context("instrument metadata")?;
    println!("ok: {} ({})", config.display(), &cfg.run_id()[..16]);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, csv, seed, ticks, json } => run(config, csv, seed, ticks, json),
        Command::Validate { config } => validate(&config),
    }
}

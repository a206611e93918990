#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that drives a headless Queue Match session.

mod config;
mod demo;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use glam::Vec3;
use queue_match_session::Session;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::{
    config::CliConfig,
    demo::{DemoReport, DemoSettings},
};

/// Command-line arguments for the Queue Match adapter.
#[derive(Debug, Parser)]
#[command(name = "queue-match", version, about = "Headless Queue Match session driver")]
struct CliArgs {
    /// TOML configuration file; defaults are used when it is absent.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Plays a seeded scripted session against a simulated motion host.
    Demo(DemoArgs),
    /// Plans a path between two world positions.
    Path(PathArgs),
}

#[derive(Debug, Args)]
struct DemoArgs {
    /// Seed for unit placement and colors.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Overrides the number of units from the configuration.
    #[arg(long)]
    units: Option<u32>,
    /// Prints the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct PathArgs {
    /// Start position as `x,y,z`.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    from: Vec3,
    /// Target position as `x,y,z`.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    to: Vec3,
    /// Uses the breadth-first search instead of the configured strategy.
    #[arg(long)]
    alternative: bool,
    /// Adds half-cell waypoints between interior waypoints.
    #[arg(long)]
    densify: bool,
    /// Prints the path as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct PathReport {
    search: String,
    cells: Vec<[u32; 2]>,
    waypoints: Vec<[f32; 3]>,
}

/// Entry point for the Queue Match command-line interface.
fn main() -> Result<()> {
    let args = CliArgs::parse();
    let (config, source) = CliConfig::load(args.config.as_deref())?;
    init_tracing(&config.logging.level);
    source.log();

    let mut session = Session::new(config.session_config()?);
    println!("{}", session.welcome_banner());

    match args.command {
        CliCommand::Demo(demo_args) => run_demo(&mut session, &config, &demo_args),
        CliCommand::Path(path_args) => run_path(&mut session, &path_args),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_demo(session: &mut Session, config: &CliConfig, args: &DemoArgs) -> Result<()> {
    let settings = DemoSettings {
        seed: args.seed,
        units: args.units.unwrap_or(config.demo.units),
        colors: config.demo.colors.clone(),
        tick: Duration::from_millis(config.demo.tick_ms),
        removal_frames: config.demo.removal_frames,
        max_frames: config.demo.max_frames,
    };

    let report = demo::run(session, &settings);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode demo report")?
        );
    } else {
        print_demo_report(&report);
    }
    Ok(())
}

fn print_demo_report(report: &DemoReport) {
    println!("seed:        {}", report.seed);
    println!("frames:      {}", report.frames);
    println!("queued:      {}", report.queued);
    println!("unreachable: {}", report.unreachable);
    println!("rejected:    {}", report.rejected);
    println!("runs:        {}", report.runs_cleared);
    println!("cycles:      {}", report.cycles_completed);
    println!("queue:       [{}]", report.slots.join(" "));
}

fn run_path(session: &mut Session, args: &PathArgs) -> Result<()> {
    let path = if args.alternative {
        session.find_alternative_path(args.from, args.to)
    } else {
        session.find_path(args.from, args.to)
    };

    let Some(path) = path else {
        println!("no path from {} to {}", args.from, args.to);
        return Ok(());
    };

    let waypoints = if args.densify {
        path.densified(session.grid().cell_size())
    } else {
        path.waypoints().to_vec()
    };

    if args.json {
        let report = PathReport {
            search: format!("{:?}", path.search()),
            cells: path.cells().iter().map(|cell| [cell.x(), cell.z()]).collect(),
            waypoints: waypoints.iter().map(|point| point.to_array()).collect(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode path")?
        );
    } else {
        println!("{:?} search, {} steps", path.search(), path.step_count());
        for point in waypoints {
            println!("{:.3} {:.3} {:.3}", point.x, point.y, point.z);
        }
    }
    Ok(())
}

fn parse_point(value: &str) -> Result<Vec3, String> {
    let parts: Vec<_> = value.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z but got `{value}`"));
    };

    let parse = |part: &str| {
        part.parse::<f32>()
            .map_err(|error| format!("invalid coordinate `{part}`: {error}"))
    };
    Ok(Vec3::new(parse(x)?, parse(y)?, parse(z)?))
}

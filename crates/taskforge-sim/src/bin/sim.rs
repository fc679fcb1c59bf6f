#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use taskforge_core::config::{ConfigError, resolve_config};
use taskforge_sim::campaign::{CampaignConfig, run_campaign};
use taskforge_sim::{SimulationConfig, Simulator};
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "taskforge-sim",
    version,
    about = "Run seeded multi-device simulations of the taskforge sync layer",
    after_help = "EXAMPLES:\n    # One seed, human-readable summary\n    taskforge-sim --seed 7\n\n    # 500-seed campaign with repairs folded into the delete batch\n    taskforge-sim --seed 0 --seeds 500 --fold-repairs true --json"
)]
struct Cli {
    /// Seed for a single run, or the first seed of a campaign.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Run a campaign over this many consecutive seeds.
    #[arg(long)]
    seeds: Option<u64>,

    #[arg(long, default_value_t = 3)]
    devices: usize,

    #[arg(long, default_value_t = 2)]
    users: usize,

    #[arg(long, default_value_t = 64)]
    steps: u64,

    /// Percent of project deletions that meet an injected commit failure.
    #[arg(long, default_value_t = 20)]
    commit_fault_percent: u8,

    /// Percent of steps that plant a task with a missing or stale owner.
    #[arg(long, default_value_t = 10)]
    legacy_write_percent: u8,

    /// Override `cascade.fold_repairs` from the config file.
    #[arg(long)]
    fold_repairs: Option<bool>,

    /// Config file (defaults to the user config location).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TASKFORGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "taskforge=debug,info"
        } else {
            "taskforge=info,warn"
        })
    });

    let format = env::var("TASKFORGE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let core = resolve_config(cli.config.as_deref())
        .inspect_err(|err| {
            if let Some(parse) = err.downcast_ref::<ConfigError>() {
                error!(code = %parse.code(), hint = ?parse.code().hint(), "config rejected");
            }
        })
        .context("Failed to load taskforge config")?;
    let fold_repairs = cli.fold_repairs.unwrap_or(core.cascade.fold_repairs);

    if let Some(count) = cli.seeds {
        let config = CampaignConfig {
            seed_range: cli.seed..cli.seed.saturating_add(count),
            device_count: cli.devices,
            user_count: cli.users,
            steps: cli.steps,
            commit_fault_percent: cli.commit_fault_percent,
            legacy_write_percent: cli.legacy_write_percent,
            fold_repairs,
        };
        let report = run_campaign(&config)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "campaign complete: seeds_run={} seeds_passed={} interesting={} first_failure={:?}",
                report.seeds_run,
                report.seeds_passed,
                report.interesting_states_reached,
                report.first_failure
            );
            for failure in &report.failures {
                for violation in &failure.violations {
                    println!("  seed {}: {violation}", failure.seed);
                }
            }
        }
        if !report.all_passed() {
            bail!("{} of {} seeds failed", report.failures.len(), report.seeds_run);
        }
        return Ok(());
    }

    let mut simulator = Simulator::new(SimulationConfig {
        seed: cli.seed,
        device_count: cli.devices,
        user_count: cli.users,
        steps: cli.steps,
        commit_fault_percent: cli.commit_fault_percent,
        legacy_write_percent: cli.legacy_write_percent,
        fold_repairs,
    })?;
    let result = simulator.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "simulation complete: trace_events={} violations={} interesting={} projects={} tasks={}",
            result.trace.len(),
            result.violations.len(),
            result.interesting_state_reached,
            result.projects_remaining,
            result.tasks_remaining
        );
        for v in &result.violations {
            println!("  step {}: {}", v.step, v.violation);
        }
    }
    if !result.passed() {
        bail!("seed {} violated {} invariant(s)", result.seed, result.violations.len());
    }
    Ok(())
}

// src/main.rs
//
// -----------------------------------------------------------------------------
// csi-readiness - end-to-end readiness checks for CSI plugin deployments
// -----------------------------------------------------------------------------

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use csi_readiness::config::{Config, RunStep, StepConfig, TargetKind, WaitStep};
use csi_readiness::executor::{self, CommandExecutor};
use csi_readiness::readiness::evaluate_once;
use csi_readiness::sampler::{SampleOutcome, StatusSampler};
use csi_readiness::scenario::{self, Scenario};

// -----------------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------------
#[derive(Parser)]
#[command(
    name = "csi-readiness",
    version,
    about = "Decide whether a CSI plugin deployment came up, by watching pod status lines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll one readiness check until success, failure or timeout
    ///
    /// Examples:
    ///   csi-readiness wait --config aggregation.yaml --check plugin
    ///   csi-readiness -v wait --config aggregation.yaml --check workload
    Wait {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        check: String,
    },
    /// Run every scenario step of the config in order
    ///
    /// Examples:
    ///   csi-readiness run --config aggregation.yaml
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Classify a single sample and print the per-resource phases
    ///
    /// Reads the sample from --input (a file, or "-" for stdin). Without
    /// --input the status query runs once against the configured target.
    ///
    /// Examples:
    ///   kubectl get pods | csi-readiness classify --config c.yaml --check plugin --input -
    ///   csi-readiness classify --config c.yaml --check plugin
    Classify {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        check: String,
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
    },
    /// Parse and validate a config file, then print a summary
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

// -----------------------------------------------------------------------------
// main
// -----------------------------------------------------------------------------
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v when set
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("csi_readiness={}", level)));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command {
        Commands::Wait { config, check } => wait_cmd(&config, &check),
        Commands::Run { config } => run_cmd(&config),
        Commands::Classify {
            config,
            check,
            input,
        } => classify_cmd(&config, &check, input.as_deref()),
        Commands::Validate { config } => validate_cmd(&config),
    }
}

fn open_target(cfg: &Config) -> Result<Box<dyn CommandExecutor>> {
    executor::connect(&cfg.target).context("Failed to open command channel")
}

// -----------------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------------
fn wait_cmd(config_path: &Path, check: &str) -> Result<()> {
    let cfg = Config::load(config_path)?;
    let exec = open_target(&cfg)?;

    let result = scenario::driver_for(&cfg, check, exec.as_ref())?
        .run()
        .with_context(|| format!("readiness check '{}' aborted", check))?;

    if let Some(dump) = &result.diagnostics {
        eprint!("{}", dump);
    }

    let result = result
        .into_result()
        .with_context(|| format!("readiness check '{}' failed", check))?;

    println!(
        "✓ {} ready after {} ticks ({:.1}s)",
        result.check,
        result.ticks,
        result.elapsed.as_secs_f64()
    );
    Ok(())
}

fn run_cmd(config_path: &Path) -> Result<()> {
    let cfg = Config::load(config_path)?;
    if cfg.steps.is_empty() {
        bail!("{} defines no steps", config_path.display());
    }
    let exec = open_target(&cfg)?;

    let report = Scenario::new(&cfg, exec.as_ref()).run();

    for step in &report.steps {
        let mark = if step.outcome.is_ok() { "✓" } else { "✗" };
        println!(
            "{} [{}/{}] {} ({:.1}s)",
            mark,
            step.index,
            report.total,
            step.description,
            step.elapsed.as_secs_f64()
        );
    }

    if let Some(dump) = report.diagnostics() {
        eprint!("{}", dump);
    }

    report.into_result()?;
    println!("Success!");
    Ok(())
}

fn classify_cmd(config_path: &Path, check: &str, input: Option<&Path>) -> Result<()> {
    let cfg = Config::load(config_path)?;
    let specs = cfg.check(check)?.compile()?;

    let outcome = match input {
        Some(path) if path == Path::new("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read sample from stdin")?;
            SampleOutcome::from_output(&buf)
        }
        Some(path) => {
            let buf = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            SampleOutcome::from_output(&buf)
        }
        None => {
            let exec = open_target(&cfg)?;
            StatusSampler::new(exec.as_ref(), cfg.queries.status.clone()).sample()?
        }
    };

    let (result, verdict) = evaluate_once(&outcome, &specs);
    let (Some(result), SampleOutcome::Lines(sample)) = (result, &outcome) else {
        info!("sample holds no lines");
        println!("verdict: {} (empty sample)", verdict);
        return Ok(());
    };

    for status in result.statuses() {
        match status.line {
            Some(idx) => println!(
                "{:<20} {:<14} {}",
                status.resource,
                status.phase.to_string(),
                sample.lines()[idx]
            ),
            None => println!("{:<20} {}", status.resource, status.phase),
        }
    }
    for amb in result.ambiguities() {
        println!("ambiguous: {}", amb);
    }

    println!("verdict: {}", verdict);
    Ok(())
}

fn validate_cmd(config_path: &Path) -> Result<()> {
    let cfg = Config::load(config_path)?;

    match cfg.target.kind {
        TargetKind::Local => println!("target: local"),
        TargetKind::Ssh => println!(
            "target: ssh {}",
            cfg.target.host.as_deref().unwrap_or_default()
        ),
    }
    println!("status query: {}", cfg.queries.status);
    if let Some(events) = &cfg.queries.events {
        println!("events query: {}", events);
    }

    for (name, check) in &cfg.checks {
        println!(
            "check {}: {} resources, warm-up {}, interval {}, budget {} ticks",
            name,
            check.resources.len(),
            humantime::format_duration(check.warmup),
            humantime::format_duration(check.interval),
            check.budget
        );
        for res in &check.resources {
            println!("  - {}", res.name);
        }
    }

    for (idx, step) in cfg.steps.iter().enumerate() {
        match step {
            StepConfig::Run(RunStep { run, .. }) => println!("step {}: run {}", idx + 1, run),
            StepConfig::Wait(WaitStep { wait }) => println!("step {}: wait {}", idx + 1, wait),
        }
    }

    println!("✓ {} is valid", config_path.display());
    Ok(())
}

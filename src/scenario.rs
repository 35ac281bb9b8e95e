// src/scenario.rs
//! Scenario runner
//!
//! Executes the configured steps in order against one command channel:
//! `run` steps are plain commands (apply manifests, create secrets, ...),
//! `wait` steps are full readiness checks with their own budget and state
//! machine. The first failing step stops the scenario.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{Config, RunStep, StepConfig, WaitStep};
use crate::executor::CommandExecutor;
use crate::poll::{PollDriver, RunResult};

/// Build the poll driver of a named check from the configuration
pub fn driver_for<'a>(
    config: &Config,
    check: &str,
    executor: &'a dyn CommandExecutor,
) -> Result<PollDriver<'a>> {
    let check_cfg = config.check(check)?;
    let specs = check_cfg.compile()?;

    Ok(PollDriver::new(check, executor, specs, check_cfg.settings())
        .with_status_query(config.queries.status.clone())
        .with_events_query(config.queries.events.clone()))
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Command exited zero
    Ran { exit_status: i32 },
    /// Command exited non-zero but the step allows failure
    Tolerated { exit_status: i32, stderr: String },
    /// Command exited non-zero
    CommandFailed { exit_status: i32, stderr: String },
    /// Readiness check finished (successfully or not)
    Checked(RunResult),
    /// The step could not be carried out at all
    Aborted(String),
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        match self {
            StepOutcome::Ran { .. } | StepOutcome::Tolerated { .. } => true,
            StepOutcome::Checked(result) => result.is_success(),
            StepOutcome::CommandFailed { .. } | StepOutcome::Aborted(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based position in the scenario
    pub index: usize,
    pub description: String,
    pub elapsed: Duration,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    /// Number of configured steps (including ones never reached)
    pub total: usize,
}

impl ScenarioReport {
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| !s.outcome.is_ok())
    }

    pub fn is_success(&self) -> bool {
        self.failed_step().is_none() && self.steps.len() == self.total
    }

    /// Diagnostic dump of the failing readiness check, if that is what failed
    pub fn diagnostics(&self) -> Option<&str> {
        match &self.failed_step()?.outcome {
            StepOutcome::Checked(result) => result.diagnostics.as_deref(),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<ScenarioReport> {
        let Some(step) = self.failed_step() else {
            return Ok(self);
        };
        let why = match &step.outcome {
            StepOutcome::CommandFailed {
                exit_status,
                stderr,
            } => format!("exit status {}: {}", exit_status, stderr),
            StepOutcome::Checked(result) => result.verdict.to_string(),
            StepOutcome::Aborted(reason) => reason.clone(),
            StepOutcome::Ran { .. } | StepOutcome::Tolerated { .. } => String::new(),
        };
        Err(anyhow!(
            "step {}/{} ({}) failed: {}",
            step.index,
            self.total,
            step.description,
            why
        ))
    }
}

pub struct Scenario<'a> {
    config: &'a Config,
    executor: &'a dyn CommandExecutor,
}

impl<'a> Scenario<'a> {
    pub fn new(config: &'a Config, executor: &'a dyn CommandExecutor) -> Self {
        Self { config, executor }
    }

    pub fn run(&self) -> ScenarioReport {
        let total = self.config.steps.len();
        let mut report = ScenarioReport {
            steps: Vec::with_capacity(total),
            total,
        };

        info!("Running {} steps on {}", total, self.executor.target());

        for (idx, step) in self.config.steps.iter().enumerate() {
            let index = idx + 1;
            let started = Instant::now();
            let (description, outcome) = match step {
                StepConfig::Run(RunStep { run, allow_failure }) => {
                    info!(" - [{}/{}] {}", index, total, run);
                    (run.clone(), self.run_command(run, *allow_failure))
                }
                StepConfig::Wait(WaitStep { wait }) => {
                    info!(" - [{}/{}] waiting for '{}'", index, total, wait);
                    (format!("wait {}", wait), self.wait_for(wait))
                }
            };

            let ok = outcome.is_ok();
            report.steps.push(StepReport {
                index,
                description,
                elapsed: started.elapsed(),
                outcome,
            });

            if !ok {
                error!("✗ Step {}/{} failed, skipping remaining steps", index, total);
                break;
            }
        }

        if report.is_success() {
            info!("✓ All {} steps completed", total);
        }
        report
    }

    fn run_command(&self, command: &str, allow_failure: bool) -> StepOutcome {
        let command = if self.config.target.sudo {
            format!("sudo {}", command)
        } else {
            command.to_string()
        };

        match self.executor.execute(&command) {
            Ok(out) if out.success() => StepOutcome::Ran {
                exit_status: out.exit_status,
            },
            Ok(out) if allow_failure => {
                warn!(
                    "`{}` exited with {} (allowed): {}",
                    command,
                    out.exit_status,
                    out.stderr.trim()
                );
                StepOutcome::Tolerated {
                    exit_status: out.exit_status,
                    stderr: out.stderr.trim().to_string(),
                }
            }
            Ok(out) => StepOutcome::CommandFailed {
                exit_status: out.exit_status,
                stderr: out.stderr.trim().to_string(),
            },
            Err(e) => StepOutcome::Aborted(e.to_string()),
        }
    }

    fn wait_for(&self, check: &str) -> StepOutcome {
        let driver = match driver_for(self.config, check, self.executor) {
            Ok(driver) => driver,
            Err(e) => return StepOutcome::Aborted(format!("{:#}", e)),
        };
        match driver.run() {
            Ok(result) => StepOutcome::Checked(result),
            Err(e) => StepOutcome::Aborted(e.to_string()),
        }
    }
}

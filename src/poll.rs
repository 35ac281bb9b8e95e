// src/poll.rs
//! Poll driver
//!
//! Owns the timing loop of one readiness check:
//! 1. sleep the warm-up delay once
//! 2. while budget remains: decrement, sleep one interval, sample, classify,
//!    evaluate
//! 3. stop on the first terminal verdict, or time out when the budget is gone
//!
//! Fixed interval, no backoff: cluster transition time is roughly bounded for
//! this use case. Budget and state machine live inside the driver, and
//! [`PollDriver::run`] consumes it, so two checks can never share either.

use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::classifier::{classify, ClassificationResult, ResourceSpec};
use crate::constants::{
    DEFAULT_EVENTS_QUERY, DEFAULT_POLL_BUDGET, DEFAULT_POLL_INTERVAL, DEFAULT_STATUS_QUERY,
    DEFAULT_WARMUP, DUMP_RULE_WIDTH,
};
use crate::error::ReadinessError;
use crate::executor::CommandExecutor;
use crate::readiness::{ReadinessMachine, Verdict, UNRECOGNIZED_STATE};
use crate::sampler::{Sample, SampleOutcome, StatusSampler};

/// Remaining ticks before a forced timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    initial: u32,
    remaining: u32,
}

impl PollBudget {
    pub fn new(ticks: u32) -> Self {
        Self {
            initial: ticks,
            remaining: ticks,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Ticks consumed so far
    pub fn spent(&self) -> u32 {
        self.initial - self.remaining
    }

    /// Consume one tick; false when nothing was left.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Timing parameters of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub warmup: Duration,
    pub interval: Duration,
    pub budget: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            warmup: DEFAULT_WARMUP,
            interval: DEFAULT_POLL_INTERVAL,
            budget: DEFAULT_POLL_BUDGET,
        }
    }
}

/// Final outcome of one readiness check
#[derive(Debug, Clone)]
pub struct RunResult {
    pub check: String,
    pub verdict: Verdict,
    /// Ticks consumed (warm-up not included)
    pub ticks: u32,
    pub elapsed: Duration,
    pub last_sample: Option<Sample>,
    pub last_classification: Option<ClassificationResult>,
    /// Dump written on failure or timeout
    pub diagnostics: Option<String>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }

    fn state_summary(&self) -> String {
        self.last_classification
            .as_ref()
            .map(ClassificationResult::summary)
            .unwrap_or_else(|| "no sample captured".to_string())
    }

    /// `Ok` on success, otherwise the matching [`ReadinessError`].
    pub fn into_result(self) -> Result<RunResult, ReadinessError> {
        match &self.verdict {
            Verdict::Success => Ok(self),
            Verdict::Failure(reason) => {
                let ambiguities = self
                    .last_classification
                    .as_ref()
                    .map(ClassificationResult::ambiguities)
                    .unwrap_or_default();
                if !ambiguities.is_empty() {
                    let detail = ambiguities
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    Err(ReadinessError::ambiguous(format!(
                        "check '{}': {}",
                        self.check, detail
                    )))
                } else if reason == UNRECOGNIZED_STATE {
                    Err(ReadinessError::unrecognized(format!(
                        "check '{}' after {} ticks ({})",
                        self.check,
                        self.ticks,
                        self.state_summary()
                    )))
                } else {
                    Err(ReadinessError::unrecognized(format!(
                        "check '{}' after {} ticks: {} ({})",
                        self.check,
                        self.ticks,
                        reason,
                        self.state_summary()
                    )))
                }
            }
            Verdict::Timeout | Verdict::Continue => Err(ReadinessError::Timeout {
                ticks: self.ticks,
                detail: format!("check '{}' last seen {}", self.check, self.state_summary()),
            }),
        }
    }
}

type Sleeper<'a> = Box<dyn FnMut(Duration) + 'a>;

/// Drives one readiness check against one command channel
pub struct PollDriver<'a> {
    name: String,
    executor: &'a dyn CommandExecutor,
    specs: Vec<ResourceSpec>,
    settings: PollSettings,
    status_query: String,
    events_query: Option<String>,
    sleeper: Sleeper<'a>,
}

impl<'a> PollDriver<'a> {
    pub fn new(
        name: impl Into<String>,
        executor: &'a dyn CommandExecutor,
        specs: Vec<ResourceSpec>,
        settings: PollSettings,
    ) -> Self {
        Self {
            name: name.into(),
            executor,
            specs,
            settings,
            status_query: DEFAULT_STATUS_QUERY.to_string(),
            events_query: Some(DEFAULT_EVENTS_QUERY.to_string()),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    pub fn with_status_query(mut self, query: impl Into<String>) -> Self {
        self.status_query = query.into();
        self
    }

    /// `None` skips the events section of the diagnostic dump
    pub fn with_events_query(mut self, query: Option<String>) -> Self {
        self.events_query = query;
        self
    }

    /// Replace `std::thread::sleep`, e.g. to record delays in tests
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn run(mut self) -> Result<RunResult, ReadinessError> {
        let started = Instant::now();
        let sampler = StatusSampler::new(self.executor, self.status_query.clone());
        let mut machine = ReadinessMachine::new();
        let mut budget = PollBudget::new(self.settings.budget);
        let mut last_sample: Option<Sample> = None;
        let mut last_classification: Option<ClassificationResult> = None;

        info!(
            check = %self.name,
            target = %self.executor.target(),
            resources = self.specs.len(),
            budget = self.settings.budget,
            "Waiting for readiness"
        );

        if !self.settings.warmup.is_zero() {
            debug!(check = %self.name, "warm-up {:?}", self.settings.warmup);
            (self.sleeper)(self.settings.warmup);
        }

        let mut verdict = Verdict::Continue;
        while budget.consume() {
            (self.sleeper)(self.settings.interval);

            let sample = match sampler.sample() {
                Ok(SampleOutcome::Lines(sample)) => sample,
                Ok(SampleOutcome::Empty) => {
                    warn!(check = %self.name, tick = budget.spent(), "empty sample, skipping tick");
                    continue;
                }
                Err(e) => {
                    error!(check = %self.name, tick = budget.spent(), error = %e, "sampling failed");
                    return Err(e);
                }
            };

            let classification = classify(&sample, &self.specs);
            verdict = machine.observe(&classification);
            debug!(
                check = %self.name,
                tick = budget.spent(),
                remaining = budget.remaining(),
                verdict = %verdict,
                "{}",
                classification.summary()
            );

            last_sample = Some(sample);
            last_classification = Some(classification);

            if verdict.is_terminal() {
                break;
            }
        }

        if !verdict.is_terminal() {
            verdict = machine.expire();
        }

        let mut result = RunResult {
            check: self.name.clone(),
            verdict,
            ticks: budget.spent(),
            elapsed: started.elapsed(),
            last_sample,
            last_classification,
            diagnostics: None,
        };

        if result.is_success() {
            info!(check = %self.name, ticks = result.ticks, "✓ ready after {:?}", result.elapsed);
        } else {
            error!(check = %self.name, ticks = result.ticks, "✗ {}", result.verdict);
            result.diagnostics = Some(self.diagnostic_dump(&result));
        }

        Ok(result)
    }

    fn diagnostic_dump(&self, result: &RunResult) -> String {
        let rule = "-".repeat(DUMP_RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{}", "=".repeat(DUMP_RULE_WIDTH));
        let _ = writeln!(out, "readiness check '{}': {}", self.name, result.verdict);
        let _ = writeln!(
            out,
            "ticks: {}/{}  elapsed: {:?}",
            result.ticks, self.settings.budget, result.elapsed
        );
        let _ = writeln!(out, "state: {}", result.state_summary());

        if let Some(classification) = &result.last_classification {
            let absent: Vec<&str> = classification.absent().collect();
            if !absent.is_empty() {
                let _ = writeln!(out, "unrecognized: {}", absent.join(", "));
            }
            for amb in classification.ambiguities() {
                let _ = writeln!(out, "ambiguous: {}", amb);
            }
        }

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "last sample (`{}`):", self.status_query);
        match &result.last_sample {
            Some(sample) => {
                let _ = write!(out, "{}", sample);
            }
            None => {
                let _ = writeln!(out, "(no sample captured)");
            }
        }

        if let Some(events_query) = &self.events_query {
            let _ = writeln!(out, "{}", rule);
            let _ = writeln!(out, "events (`{}`):", events_query);
            match self.executor.execute(events_query) {
                Ok(events) if events.success() => {
                    let _ = write!(out, "{}", events.stdout);
                }
                Ok(events) => {
                    warn!("events query exited with {}", events.exit_status);
                    let _ = writeln!(
                        out,
                        "(exit status {}) {}",
                        events.exit_status,
                        events.stderr.trim()
                    );
                }
                Err(e) => {
                    warn!(error = %e, "events query failed");
                    let _ = writeln!(out, "(unavailable: {})", e);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down_to_zero_and_stops() {
        let mut budget = PollBudget::new(2);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert!(budget.is_exhausted());
        assert_eq!(budget.spent(), 2);
    }

    #[test]
    fn zero_budget_is_already_exhausted() {
        let mut budget = PollBudget::new(0);
        assert!(budget.is_exhausted());
        assert!(!budget.consume());
        assert_eq!(budget.spent(), 0);
    }

    #[test]
    fn default_settings_follow_constants() {
        let settings = PollSettings::default();
        assert_eq!(settings.warmup, Duration::from_secs(30));
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.budget, 220);
    }
}

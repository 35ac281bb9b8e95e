// src/sampler.rs
//! Status sampler: one read-only cluster query per poll tick

use std::fmt;
use tracing::{debug, warn};

use crate::error::ReadinessError;
use crate::executor::CommandExecutor;

/// Ordered status lines captured at one tick. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    lines: Vec<String>,
}

impl Sample {
    /// Split raw command output into lines, dropping blank ones and trailing
    /// whitespace (kubectl pads its columns).
    pub fn from_output(raw: &str) -> Self {
        let lines = raw
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// What one call to [`StatusSampler::sample`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    Lines(Sample),
    /// The query succeeded but returned nothing; treated as a no-op tick
    Empty,
}

impl SampleOutcome {
    /// `Empty` when the output holds no non-blank line
    pub fn from_output(raw: &str) -> Self {
        let sample = Sample::from_output(raw);
        if sample.is_empty() {
            SampleOutcome::Empty
        } else {
            SampleOutcome::Lines(sample)
        }
    }
}

/// Runs the status query through an injected command channel
pub struct StatusSampler<'a> {
    executor: &'a dyn CommandExecutor,
    query: String,
}

impl<'a> StatusSampler<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, query: impl Into<String>) -> Self {
        Self {
            executor,
            query: query.into(),
        }
    }

    pub fn sample(&self) -> Result<SampleOutcome, ReadinessError> {
        let out = self.executor.execute(&self.query)?;

        if !out.success() {
            return Err(ReadinessError::QueryFailed {
                command: self.query.clone(),
                status: out.exit_status,
                stderr: out.stderr.trim().to_string(),
            });
        }

        let outcome = SampleOutcome::from_output(&out.stdout);
        match &outcome {
            SampleOutcome::Empty => {
                warn!(target = %self.executor.target(), "`{}` returned no lines", self.query);
            }
            SampleOutcome::Lines(sample) => {
                debug!(lines = sample.len(), "sampled `{}`", self.query);
            }
        }
        Ok(outcome)
    }
}

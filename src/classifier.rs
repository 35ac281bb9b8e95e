// src/classifier.rs
//! Pattern classifier
//!
//! Tags every tracked resource with exactly one [`Phase`] per sample. For each
//! resource the lines are scanned once: the first `ready` match wins, else the
//! first `transitioning` match, else the first `pending` match, else the
//! resource is [`Phase::Absent`].
//!
//! Patterns are whole-line: `controller-0.*Running.*` is compiled as
//! `^(?:controller-0.*Running.*)$`, so a resource name that happens to be a
//! prefix of another pod name does not produce a substring hit.
//!
//! A line matched by patterns of more than one resource is reported as an
//! [`Ambiguity`], whichever line each resource ended up resolving to. The
//! classifier does not pick a winner.

use regex::Regex;
use std::fmt;

use crate::anchor_pattern;
use crate::error::ReadinessError;
use crate::sampler::Sample;

/// Observed state of one resource in one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Ready,
    Transitioning,
    Pending,
    Absent,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Ready => write!(f, "Ready"),
            Phase::Transitioning => write!(f, "Transitioning"),
            Phase::Pending => write!(f, "Pending"),
            Phase::Absent => write!(f, "Absent"),
        }
    }
}

/// One tracked resource and its compiled line patterns
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    name: String,
    ready: Regex,
    transitioning: Regex,
    pending: Option<Regex>,
}

impl ResourceSpec {
    /// Compile the patterns of one resource; each is anchored to the whole line.
    pub fn new(
        name: impl Into<String>,
        ready: &str,
        transitioning: &str,
        pending: Option<&str>,
    ) -> Result<Self, ReadinessError> {
        let name = name.into();
        let compile = |pattern: &str| {
            Regex::new(&anchor_pattern(pattern)).map_err(|source| {
                ReadinessError::InvalidPattern {
                    resource: name.clone(),
                    source,
                }
            })
        };

        let ready = compile(ready)?;
        let transitioning = compile(transitioning)?;
        let pending = pending.map(compile).transpose()?;

        Ok(Self {
            name,
            ready,
            transitioning,
            pending,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if any of the resource's patterns matches the line
    fn matches_any(&self, line: &str) -> bool {
        self.ready.is_match(line)
            || self.transitioning.is_match(line)
            || self.pending.as_ref().is_some_and(|re| re.is_match(line))
    }

    /// Single pass over the lines. Returns the phase and the index of the
    /// line that decided it.
    fn classify_lines(&self, lines: &[String]) -> (Phase, Option<usize>) {
        let mut transitioning = None;
        let mut pending = None;

        for (idx, line) in lines.iter().enumerate() {
            if self.ready.is_match(line) {
                return (Phase::Ready, Some(idx));
            }
            if transitioning.is_none() && self.transitioning.is_match(line) {
                transitioning = Some(idx);
            }
            if pending.is_none() {
                if let Some(re) = &self.pending {
                    if re.is_match(line) {
                        pending = Some(idx);
                    }
                }
            }
        }

        match (transitioning, pending) {
            (Some(idx), _) => (Phase::Transitioning, Some(idx)),
            (None, Some(idx)) => (Phase::Pending, Some(idx)),
            (None, None) => (Phase::Absent, None),
        }
    }
}

/// Phase of one resource plus the line it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub resource: String,
    pub phase: Phase,
    pub line: Option<usize>,
}

/// A single line claimed by more than one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub line: usize,
    pub text: String,
    pub resources: Vec<String>,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} '{}' matched by {}",
            self.line + 1,
            self.text,
            self.resources.join(", ")
        )
    }
}

/// Exactly one status per tracked resource, in resource order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    statuses: Vec<ResourceStatus>,
    ambiguities: Vec<Ambiguity>,
}

impl ClassificationResult {
    pub fn statuses(&self) -> &[ResourceStatus] {
        &self.statuses
    }

    pub fn ambiguities(&self) -> &[Ambiguity] {
        &self.ambiguities
    }

    pub fn phase_of(&self, resource: &str) -> Option<Phase> {
        self.statuses
            .iter()
            .find(|s| s.resource == resource)
            .map(|s| s.phase)
    }

    pub fn tracked(&self) -> usize {
        self.statuses.len()
    }

    /// Resources observed in any phase other than Absent
    pub fn recognized(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| s.phase != Phase::Absent)
            .count()
    }

    pub fn all_ready(&self) -> bool {
        !self.statuses.is_empty() && self.statuses.iter().all(|s| s.phase == Phase::Ready)
    }

    pub fn absent(&self) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(|s| s.phase == Phase::Absent)
            .map(|s| s.resource.as_str())
    }

    /// `controller=Ready node=Transitioning`
    pub fn summary(&self) -> String {
        self.statuses
            .iter()
            .map(|s| format!("{}={}", s.resource, s.phase))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Classify one sample against every tracked resource. Pure and deterministic.
pub fn classify(sample: &Sample, specs: &[ResourceSpec]) -> ClassificationResult {
    let lines = sample.lines();

    let statuses: Vec<ResourceStatus> = specs
        .iter()
        .map(|spec| {
            let (phase, line) = spec.classify_lines(lines);
            ResourceStatus {
                resource: spec.name().to_string(),
                phase,
                line,
            }
        })
        .collect();

    let ambiguities: Vec<Ambiguity> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, text)| {
            let claimants: Vec<String> = specs
                .iter()
                .filter(|spec| spec.matches_any(text))
                .map(|spec| spec.name().to_string())
                .collect();
            (claimants.len() > 1).then(|| Ambiguity {
                line: idx,
                text: text.clone(),
                resources: claimants,
            })
        })
        .collect();

    ClassificationResult {
        statuses,
        ambiguities,
    }
}

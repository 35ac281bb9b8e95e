// src/readiness.rs
//! Readiness state machine
//!
//! Folds one [`ClassificationResult`] per tick into a [`Verdict`]:
//!
//! - two resources resolved to the same line: `Failure` naming the ambiguity
//! - every tracked resource Ready: `Success`
//! - some resource Absent (the observed lines do not account for every
//!   tracked resource): `Failure("unrecognized state")`
//! - everything accounted for but not all Ready: `Continue`
//!
//! Deployments pass through `ContainerCreating` before `Running`, so
//! "accounted for but still transitioning" is tolerated. A line set that does
//! not match the expected shape is treated as real breakage and fails at once.

use std::fmt;
use tracing::debug;

use crate::classifier::{classify, ClassificationResult, ResourceSpec};
use crate::sampler::SampleOutcome;

/// Reason attached to failures caused by Absent resources
pub const UNRECOGNIZED_STATE: &str = "unrecognized state";

/// Per-tick decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Success,
    Failure(String),
    Timeout,
}

impl Verdict {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Continue => write!(f, "continue"),
            Verdict::Success => write!(f, "success"),
            Verdict::Failure(reason) => write!(f, "failure: {}", reason),
            Verdict::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    Waiting,
    Succeeded,
    Failed(String),
    TimedOut,
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadinessState::Waiting)
    }

    fn verdict(&self) -> Verdict {
        match self {
            ReadinessState::Waiting => Verdict::Continue,
            ReadinessState::Succeeded => Verdict::Success,
            ReadinessState::Failed(reason) => Verdict::Failure(reason.clone()),
            ReadinessState::TimedOut => Verdict::Timeout,
        }
    }
}

/// Verdict a fresh machine reaches on one sample. An empty sample is a no-op
/// and yields `Continue` with no classification.
pub fn evaluate_once(
    outcome: &SampleOutcome,
    specs: &[ResourceSpec],
) -> (Option<ClassificationResult>, Verdict) {
    match outcome {
        SampleOutcome::Empty => (None, Verdict::Continue),
        SampleOutcome::Lines(sample) => {
            let result = classify(sample, specs);
            let verdict = ReadinessMachine::new().observe(&result);
            (Some(result), verdict)
        }
    }
}

/// One instance per readiness check; never shared between checks.
#[derive(Debug, Clone)]
pub struct ReadinessMachine {
    state: ReadinessState,
}

impl Default for ReadinessMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessMachine {
    pub fn new() -> Self {
        Self {
            state: ReadinessState::Waiting,
        }
    }

    pub fn state(&self) -> &ReadinessState {
        &self.state
    }

    /// Evaluate one classified sample.
    ///
    /// Terminal states are sticky: once Succeeded, Failed or TimedOut, every
    /// further call returns the same verdict without looking at `result`.
    pub fn observe(&mut self, result: &ClassificationResult) -> Verdict {
        if self.state.is_terminal() {
            return self.state.verdict();
        }

        self.state = Self::evaluate(result);
        debug!(state = ?self.state, "{}", result.summary());
        self.state.verdict()
    }

    /// The poll budget ran out. Only moves Waiting to TimedOut.
    pub fn expire(&mut self) -> Verdict {
        if !self.state.is_terminal() {
            self.state = ReadinessState::TimedOut;
        }
        self.state.verdict()
    }

    fn evaluate(result: &ClassificationResult) -> ReadinessState {
        if !result.ambiguities().is_empty() {
            let detail = result
                .ambiguities()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return ReadinessState::Failed(format!("ambiguous patterns: {}", detail));
        }

        if result.all_ready() {
            return ReadinessState::Succeeded;
        }

        if result.recognized() != result.tracked() {
            return ReadinessState::Failed(UNRECOGNIZED_STATE.to_string());
        }

        ReadinessState::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, ResourceSpec};
    use crate::sampler::Sample;

    fn specs() -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new(
                "controller",
                ".*controller-0.*3/3.*Running.*",
                ".*controller-0.*ContainerCreating.*",
                None,
            )
            .unwrap(),
            ResourceSpec::new(
                "node",
                ".*node-.*2/2.*Running.*",
                ".*node-.*ContainerCreating.*",
                None,
            )
            .unwrap(),
        ]
    }

    fn observe(lines: &[&str]) -> Verdict {
        let result = classify(&Sample::from_lines(lines.iter().copied()), &specs());
        ReadinessMachine::new().observe(&result)
    }

    #[test]
    fn all_running_succeeds() {
        assert_eq!(
            observe(&["controller-0 3/3 Running", "node-xyz 2/2 Running"]),
            Verdict::Success
        );
    }

    #[test]
    fn creating_controller_continues() {
        assert_eq!(
            observe(&["controller-0 0/3 ContainerCreating", "node-xyz 2/2 Running"]),
            Verdict::Continue
        );
    }

    #[test]
    fn missing_node_fails_as_unrecognized() {
        assert_eq!(
            observe(&["controller-0 3/3 Running"]),
            Verdict::Failure(UNRECOGNIZED_STATE.to_string())
        );
    }

    #[test]
    fn crash_looping_node_is_absent_and_fails() {
        assert_eq!(
            observe(&["controller-0 3/3 Running", "node-xyz 1/2 CrashLoopBackOff"]),
            Verdict::Failure(UNRECOGNIZED_STATE.to_string())
        );
    }

    #[test]
    fn ambiguity_fails_even_when_everything_looks_ready() {
        let specs = vec![
            ResourceSpec::new("a", ".*Running.*", ".*ContainerCreating.*", None).unwrap(),
            ResourceSpec::new("b", ".*3/3.*", ".*0/3.*", None).unwrap(),
        ];
        let result = classify(&Sample::from_lines(["controller-0 3/3 Running"]), &specs);
        match ReadinessMachine::new().observe(&result) {
            Verdict::Failure(reason) => assert!(reason.starts_with("ambiguous patterns")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn empty_sample_evaluates_to_continue() {
        let (result, verdict) = evaluate_once(&SampleOutcome::from_output("\n  \n"), &specs());
        assert!(result.is_none());
        assert_eq!(verdict, Verdict::Continue);
    }

    #[test]
    fn single_sample_evaluation_matches_the_machine() {
        let outcome = SampleOutcome::from_output("controller-0 3/3 Running\n");
        let (result, verdict) = evaluate_once(&outcome, &specs());
        assert_eq!(result.map(|r| r.summary()).as_deref(), Some("controller=Ready node=Absent"));
        assert_eq!(verdict, Verdict::Failure(UNRECOGNIZED_STATE.to_string()));
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut machine = ReadinessMachine::new();
        let ready = classify(
            &Sample::from_lines(["controller-0 3/3 Running", "node-xyz 2/2 Running"]),
            &specs(),
        );
        let broken = classify(&Sample::from_lines(["garbage"]), &specs());

        assert_eq!(machine.observe(&ready), Verdict::Success);
        assert_eq!(machine.observe(&broken), Verdict::Success);
        assert_eq!(machine.expire(), Verdict::Success);
        assert_eq!(machine.state(), &ReadinessState::Succeeded);
    }

    #[test]
    fn expire_only_times_out_a_waiting_machine() {
        let mut machine = ReadinessMachine::new();
        let creating = classify(
            &Sample::from_lines(["controller-0 0/3 ContainerCreating", "node-a 0/2 ContainerCreating"]),
            &specs(),
        );
        assert_eq!(machine.observe(&creating), Verdict::Continue);
        assert_eq!(machine.expire(), Verdict::Timeout);
        assert!(machine.state().is_terminal());
    }
}

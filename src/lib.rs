// src/lib.rs

pub mod classifier;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod poll;
pub mod readiness;
pub mod sampler;
pub mod scenario;
pub mod ssh;

pub use classifier::{classify, ClassificationResult, Phase, ResourceSpec};
pub use error::{ExecError, ReadinessError};
pub use executor::{CommandExecutor, CommandOutput, LocalExecutor};
pub use poll::{PollDriver, PollSettings, RunResult};
pub use readiness::{ReadinessMachine, Verdict};
pub use sampler::{Sample, StatusSampler};

/// Wraps a line pattern so it must match the whole line.
pub fn anchor_pattern(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

// src/error.rs
//! Error types for readiness checks
//!
//! Every variant is terminal for the check that produced it; nothing here is
//! retried internally. The binary layer wraps these in `anyhow` with context.

use thiserror::Error;

/// Terminal outcome of a readiness check that did not succeed
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadinessError {
    /// The command channel could not execute the query at all
    #[error("target unreachable: {0}")]
    UnreachableTarget(String),

    /// The query executed but exited non-zero
    #[error("query `{command}` failed with exit status {status}: {stderr}")]
    QueryFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Observed pod lines do not account for every tracked resource
    #[error("unrecognized state: {0}")]
    UnrecognizedState(String),

    /// Two resources resolved to the same status line
    #[error("ambiguous patterns: {0}")]
    AmbiguousPatterns(String),

    /// Budget exhausted while still waiting
    #[error("timed out after {ticks} ticks: {detail}")]
    Timeout { ticks: u32, detail: String },

    /// A resource pattern failed to compile
    #[error("invalid pattern for resource '{resource}': {source}")]
    InvalidPattern {
        resource: String,
        #[source]
        source: regex::Error,
    },
}

impl ReadinessError {
    /// Create an unrecognized-state error with the given message
    pub fn unrecognized(msg: impl Into<String>) -> Self {
        Self::UnrecognizedState(msg.into())
    }

    /// Create an ambiguous-patterns error with the given message
    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::AmbiguousPatterns(msg.into())
    }
}

/// Failure of the command channel itself (as opposed to a non-zero exit)
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error("authentication failed for {target}: {reason}")]
    Auth { target: String, reason: String },

    #[error("failed to run `{command}` on {target}: {reason}")]
    Spawn {
        target: String,
        command: String,
        reason: String,
    },
}

impl From<ExecError> for ReadinessError {
    fn from(err: ExecError) -> Self {
        ReadinessError::UnreachableTarget(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_errors_surface_as_unreachable_target() {
        let err: ReadinessError = ExecError::Auth {
            target: "vagrant@10.0.0.5:22".to_string(),
            reason: "publickey denied".to_string(),
        }
        .into();

        assert!(matches!(err, ReadinessError::UnreachableTarget(_)));
        assert!(err.to_string().contains("target unreachable"));
        assert!(err.to_string().contains("publickey denied"));
    }

    #[test]
    fn query_failure_carries_status_and_stderr() {
        let err = ReadinessError::QueryFailed {
            command: "kubectl get pods".to_string(),
            status: 1,
            stderr: "The connection to the server localhost:8080 was refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("kubectl get pods"));
        assert!(msg.contains("exit status 1"));
        assert!(msg.contains("was refused"));
    }

    #[test]
    fn timeout_reports_tick_count() {
        let err = ReadinessError::Timeout {
            ticks: 220,
            detail: "controller=Transitioning".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 220 ticks: controller=Transitioning"
        );
    }
}

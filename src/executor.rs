// src/executor.rs
//! Command execution channel
//!
//! The readiness core never talks to a cluster directly: it hands a command
//! string to a [`CommandExecutor`] and gets text back. [`LocalExecutor`] runs
//! the command on this host through `sh -c`; `crate::ssh::SshSession` runs it
//! on a remote host over SSH.

use std::process::Command;
use tracing::debug;

use crate::config::{TargetConfig, TargetKind};
use crate::error::ExecError;
use crate::ssh::SshSession;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    /// Decode raw channel output. Invalid UTF-8 is replaced, never an error,
    /// so local and remote targets read the same bytes the same way.
    pub fn from_bytes(stdout: &[u8], stderr: &[u8], exit_status: i32) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            exit_status,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// "Run a command against a target, get back text output"
///
/// `Err` means the channel itself failed (unreachable host, bad credentials,
/// missing shell). A command that ran and exited non-zero is an `Ok` with a
/// non-zero `exit_status`; deciding what that means is up to the caller.
pub trait CommandExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput, ExecError>;

    /// Human-readable description of where commands run (for logs)
    fn target(&self) -> String;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        (**self).execute(command)
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for Box<T> {
    fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        (**self).execute(command)
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

/// Runs commands on the local host
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    shell: String,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different POSIX shell (must accept `-c <command>`)
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl CommandExecutor for LocalExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        debug!("local exec: {}", command);

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| ExecError::Spawn {
                target: self.target(),
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        // Killed by a signal: no code, report as -1
        let exit_status = output.status.code().unwrap_or(-1);

        Ok(CommandOutput::from_bytes(
            &output.stdout,
            &output.stderr,
            exit_status,
        ))
    }

    fn target(&self) -> String {
        "localhost".to_string()
    }
}

/// Open the command channel described by the target configuration
pub fn connect(target: &TargetConfig) -> Result<Box<dyn CommandExecutor>, ExecError> {
    match target.kind {
        TargetKind::Local => Ok(Box::new(LocalExecutor::new())),
        TargetKind::Ssh => {
            let host = target.host.as_deref().ok_or_else(|| ExecError::Connect {
                target: "ssh".to_string(),
                reason: "no host configured".to_string(),
            })?;
            Ok(Box::new(SshSession::connect(host, &target.ssh)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_executor_captures_stdout_and_status() {
        let exec = LocalExecutor::new();
        let out = exec.execute("printf 'a\\nb\\n'").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "a\nb\n");
    }

    #[test]
    fn local_executor_reports_nonzero_exit_as_output() {
        let exec = LocalExecutor::new();
        let out = exec.execute("echo boom >&2; exit 3").unwrap();
        assert_eq!(out.exit_status, 3);
        assert!(!out.success());
        assert_eq!(out.stderr.trim(), "boom");
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let out = CommandOutput::from_bytes(b"nginx-1 \xff Running\n", b"\xfe", 0);
        assert_eq!(out.stdout, "nginx-1 \u{FFFD} Running\n");
        assert_eq!(out.stderr, "\u{FFFD}");
        assert!(out.success());
    }

    #[test]
    fn local_executor_survives_invalid_utf8() {
        let exec = LocalExecutor::new();
        let out = exec.execute("printf 'pod-a \\377 Running\\n'").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "pod-a \u{FFFD} Running\n");
    }

    #[test]
    fn default_target_is_local() {
        let exec = connect(&TargetConfig::default()).unwrap();
        assert_eq!(exec.target(), "localhost");
    }

    #[test]
    fn ssh_target_without_host_fails_to_connect() {
        let target = TargetConfig {
            kind: TargetKind::Ssh,
            ..Default::default()
        };
        assert!(matches!(connect(&target), Err(ExecError::Connect { .. })));
    }

    #[test]
    fn missing_shell_is_a_channel_error() {
        let exec = LocalExecutor::with_shell("/nonexistent/shell-for-test");
        let err = exec.execute("true").unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}

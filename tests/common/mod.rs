// tests/common/mod.rs
//
// Scripted command channel shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use csi_readiness::classifier::ResourceSpec;
use csi_readiness::error::ExecError;
use csi_readiness::executor::{CommandExecutor, CommandOutput};

/// Replays canned outputs per command. The last queued response of a command
/// repeats forever; unknown commands fail like an unreachable host.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: RefCell<HashMap<String, VecDeque<Result<CommandOutput, String>>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response with the given stdout
    pub fn respond(self, command: &str, stdout: &str) -> Self {
        self.push(
            command,
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            }),
        )
    }

    /// Queue a response that exits non-zero
    pub fn respond_status(self, command: &str, exit_status: i32, stderr: &str) -> Self {
        self.push(
            command,
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_status,
            }),
        )
    }

    /// Queue a channel failure
    pub fn fail(self, command: &str, reason: &str) -> Self {
        self.push(command, Err(reason.to_string()))
    }

    fn push(self, command: &str, response: Result<CommandOutput, String>) -> Self {
        self.responses
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == command).count()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        self.calls.borrow_mut().push(command.to_string());

        let mut responses = self.responses.borrow_mut();
        let queue = responses.get_mut(command);
        let response = match queue {
            Some(q) if q.len() > 1 => q.pop_front(),
            Some(q) => q.front().cloned(),
            None => None,
        };

        match response {
            Some(Ok(out)) => Ok(out),
            Some(Err(reason)) => Err(ExecError::Connect {
                target: "scripted".to_string(),
                reason,
            }),
            None => Err(ExecError::Spawn {
                target: "scripted".to_string(),
                command: command.to_string(),
                reason: "no scripted response".to_string(),
            }),
        }
    }

    fn target(&self) -> String {
        "scripted".to_string()
    }
}

pub const STATUS: &str = "kubectl get pods";
pub const EVENTS: &str = "kubectl get events";

pub const HEADER: &str = "NAME                         READY   STATUS              RESTARTS   AGE";

/// Controller and node resources of the JovianDSS plugin
pub fn plugin_specs() -> Vec<ResourceSpec> {
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

/// kubectl-like output: header plus the given rows
pub fn pods(rows: &[&str]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

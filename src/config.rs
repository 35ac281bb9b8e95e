// src/config.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::classifier::ResourceSpec;
use crate::constants::{
    DEFAULT_EVENTS_QUERY, DEFAULT_POLL_BUDGET, DEFAULT_POLL_INTERVAL, DEFAULT_SSH_TIMEOUT_SECS,
    DEFAULT_STATUS_QUERY, DEFAULT_WARMUP,
};
use crate::poll::PollSettings;

/// Top-level configuration: where to run, what to query, which checks exist
/// and (optionally) the ordered scenario steps.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where commands run (default: local host)
    #[serde(default)]
    pub target: TargetConfig,

    /// Read-only cluster queries
    #[serde(default)]
    pub queries: QueryConfig,

    /// Named readiness checks, e.g. "plugin" and "workload"
    pub checks: BTreeMap<String, CheckConfig>,

    /// Scenario steps executed by `run`, in order
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Command execution target
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default)]
    pub kind: TargetKind,

    /// Remote host, optionally with ":port" (ssh only)
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Prefix scenario `run` commands with "sudo ".
    /// Status and events queries are never elevated.
    #[serde(default)]
    pub sudo: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Local,
    Ssh,
}

/// SSH connection settings
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// SSH username (default: current user)
    #[serde(default)]
    pub user: Option<String>,

    /// Path to SSH private key (default: ~/.ssh/id_rsa)
    #[serde(default)]
    pub key_path: Option<String>,

    /// SSH connection timeout in seconds (default: 10)
    #[serde(default = "default_ssh_timeout")]
    pub timeout: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: None,
            key_path: None,
            timeout: default_ssh_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Sampled every tick (default: "kubectl get pods")
    #[serde(default = "default_status_query")]
    pub status: String,

    /// Dumped on failure or timeout (default: "kubectl get events").
    /// Set to null to skip.
    #[serde(default = "default_events_query")]
    pub events: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            status: default_status_query(),
            events: default_events_query(),
        }
    }
}

/// One readiness check: its resources and timing
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    /// Delay before the first sample (e.g. "30s"; default 30s)
    #[serde(default = "default_warmup", with = "humantime_serde")]
    pub warmup: Duration,

    /// Fixed delay between samples (default 1s)
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Number of ticks before timing out (default 220)
    #[serde(default = "default_budget")]
    pub budget: u32,

    pub resources: Vec<ResourcePatterns>,
}

/// Line patterns of one tracked resource. Patterns are anchored to the whole
/// line when compiled.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ResourcePatterns {
    pub name: String,
    pub ready: String,
    pub transitioning: String,
    #[serde(default)]
    pub pending: Option<String>,
}

/// One scenario step: either a command or a readiness wait
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum StepConfig {
    Run(RunStep),
    Wait(WaitStep),
}

/// `- run: <command>`, optionally with `allow_failure: true`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunStep {
    pub run: String,
    #[serde(default)]
    pub allow_failure: bool,
}

/// `- wait: <check name>`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WaitStep {
    pub wait: String,
}

impl StepConfig {
    pub fn run(command: impl Into<String>) -> Self {
        StepConfig::Run(RunStep {
            run: command.into(),
            allow_failure: false,
        })
    }

    pub fn wait(check: impl Into<String>) -> Self {
        StepConfig::Wait(WaitStep { wait: check.into() })
    }
}

fn default_ssh_timeout() -> u64 {
    DEFAULT_SSH_TIMEOUT_SECS
}

fn default_status_query() -> String {
    DEFAULT_STATUS_QUERY.to_string()
}

fn default_events_query() -> Option<String> {
    Some(DEFAULT_EVENTS_QUERY.to_string())
}

fn default_warmup() -> Duration {
    DEFAULT_WARMUP
}

fn default_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_budget() -> u32 {
    DEFAULT_POLL_BUDGET
}

impl Config {
    /// Read, parse and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_yaml(&buf).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checks.is_empty() {
            bail!("at least one check must be defined under 'checks'");
        }

        for (name, check) in &self.checks {
            check
                .validate()
                .with_context(|| format!("check '{}'", name))?;
        }

        for (idx, step) in self.steps.iter().enumerate() {
            match step {
                StepConfig::Wait(WaitStep { wait }) if !self.checks.contains_key(wait) => {
                    bail!("step {}: wait references unknown check '{}'", idx + 1, wait);
                }
                StepConfig::Run(RunStep { run, .. }) if run.trim().is_empty() => {
                    bail!("step {}: empty command", idx + 1);
                }
                _ => {}
            }
        }

        if self.target.kind == TargetKind::Ssh && self.target.host.is_none() {
            bail!("target.host is required when target.kind is 'ssh'");
        }

        if self.queries.status.trim().is_empty() {
            bail!("queries.status must not be empty");
        }

        Ok(())
    }

    pub fn check(&self, name: &str) -> Result<&CheckConfig> {
        match self.checks.get(name) {
            Some(check) => Ok(check),
            None => {
                let known: Vec<&str> = self.checks.keys().map(String::as_str).collect();
                bail!("unknown check '{}' (defined: {})", name, known.join(", "))
            }
        }
    }
}

impl CheckConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resources.is_empty() {
            bail!("no resources defined");
        }
        if self.budget == 0 {
            bail!("budget must be at least 1 tick");
        }

        let mut seen = HashSet::new();
        for res in &self.resources {
            if res.name.trim().is_empty() {
                bail!("resource with empty name");
            }
            if !seen.insert(res.name.as_str()) {
                bail!("duplicate resource '{}'", res.name);
            }
        }

        // Compiling is the pattern check
        self.compile()?;
        Ok(())
    }

    pub fn settings(&self) -> PollSettings {
        PollSettings {
            warmup: self.warmup,
            interval: self.interval,
            budget: self.budget,
        }
    }

    /// Compile every resource into a [`ResourceSpec`], in config order
    pub fn compile(&self) -> Result<Vec<ResourceSpec>> {
        self.resources
            .iter()
            .map(|r| {
                ResourceSpec::new(
                    r.name.clone(),
                    &r.ready,
                    &r.transitioning,
                    r.pending.as_deref(),
                )
                .map_err(anyhow::Error::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
checks:
  plugin:
    resources:
      - name: controller
        ready: 'controller-0.*Running.*'
        transitioning: 'controller-0.*ContainerCreating.*'
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.target.kind, TargetKind::Local);
        assert_eq!(cfg.queries.status, "kubectl get pods");
        assert_eq!(cfg.queries.events.as_deref(), Some("kubectl get events"));

        let check = cfg.check("plugin").unwrap();
        assert_eq!(check.settings(), PollSettings::default());
        assert_eq!(check.compile().unwrap().len(), 1);
    }

    #[test]
    fn humantime_durations_are_parsed() {
        let yaml = r#"
checks:
  workload:
    warmup: 0s
    interval: 500ms
    budget: 120
    resources:
      - name: nginx
        ready: 'nginx.*Running.*'
        transitioning: 'nginx.*ContainerCreating.*'
        pending: 'nginx.*Pending.*'
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        let settings = cfg.check("workload").unwrap().settings();
        assert_eq!(settings.warmup, Duration::ZERO);
        assert_eq!(settings.interval, Duration::from_millis(500));
        assert_eq!(settings.budget, 120);
    }

    #[test]
    fn steps_parse_as_run_or_wait() {
        let yaml = format!(
            "{}\nsteps:\n  - run: kubectl apply -f sc.yaml\n  - run: kubectl delete pod x\n    allow_failure: true\n  - wait: plugin\n",
            MINIMAL
        );
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert_eq!(
            cfg.steps,
            vec![
                StepConfig::run("kubectl apply -f sc.yaml"),
                StepConfig::Run(RunStep {
                    run: "kubectl delete pod x".to_string(),
                    allow_failure: true
                }),
                StepConfig::wait("plugin"),
            ]
        );
    }

    #[test]
    fn wait_on_unknown_check_is_rejected() {
        let yaml = format!("{}\nsteps:\n  - wait: nginx\n", MINIMAL);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown check 'nginx'"));
    }

    #[test]
    fn allow_failure_on_wait_step_is_rejected() {
        let yaml = format!("{}\nsteps:\n  - wait: plugin\n    allow_failure: true\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn step_with_both_run_and_wait_is_rejected() {
        let yaml = format!("{}\nsteps:\n  - run: kubectl get pods\n    wait: plugin\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn duplicate_resource_names_are_rejected() {
        let yaml = r#"
checks:
  plugin:
    resources:
      - name: node
        ready: 'a'
        transitioning: 'b'
      - name: node
        ready: 'c'
        transitioning: 'd'
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("duplicate resource 'node'"));
    }

    #[test]
    fn bad_regex_is_reported_with_check_and_resource() {
        let yaml = r#"
checks:
  plugin:
    resources:
      - name: controller
        ready: 'controller-0.*(Running'
        transitioning: 'x'
"#;
        let msg = format!("{:#}", Config::from_yaml(yaml).unwrap_err());
        assert!(msg.contains("check 'plugin'"));
        assert!(msg.contains("resource 'controller'"));
    }

    #[test]
    fn ssh_target_requires_host() {
        let yaml = format!("target:\n  kind: ssh\n{}", MINIMAL);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("target.host"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let yaml = MINIMAL.replace("    resources:", "    budget: 0\n    resources:");
        let msg = format!("{:#}", Config::from_yaml(&yaml).unwrap_err());
        assert!(msg.contains("budget must be at least 1"));
    }
}

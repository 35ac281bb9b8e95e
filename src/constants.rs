// src/constants.rs
//
// Central location for all defaults used throughout csi-readiness.
// Every value here can be overridden from the YAML configuration.

use std::time::Duration;

// =============================================================================
// Readiness Polling Defaults
// =============================================================================

/// Delay before the first sample of a check.
/// The scheduler needs time to create the initial pods; sampling earlier
/// produces false Absent classifications.
/// User can override via config: checks.<name>.warmup
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(30);

/// Fixed delay between two samples (no backoff)
/// User can override via config: checks.<name>.interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of ticks before a check is declared timed out
/// User can override via config: checks.<name>.budget
pub const DEFAULT_POLL_BUDGET: u32 = 220;

// =============================================================================
// Cluster Queries
// =============================================================================

/// Read-only query sampled on every tick
pub const DEFAULT_STATUS_QUERY: &str = "kubectl get pods";

/// Read-only query captured for the diagnostic dump on failure or timeout
pub const DEFAULT_EVENTS_QUERY: &str = "kubectl get events";

// =============================================================================
// SSH Target Defaults
// =============================================================================

/// SSH connection and channel timeout (seconds)
pub const DEFAULT_SSH_TIMEOUT_SECS: u64 = 10;

/// Port used when the target host carries no explicit ":port"
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Private key used when none is configured
pub const DEFAULT_SSH_KEY_PATH: &str = "~/.ssh/id_rsa";

/// User used when none is configured and $USER is unset
pub const FALLBACK_SSH_USER: &str = "vagrant";

/// Pause between two empty non-blocking reads of an SSH channel
pub const SSH_READ_IDLE_SLEEP: Duration = Duration::from_millis(10);

// =============================================================================
// Diagnostics
// =============================================================================

/// Width of the separator lines in the diagnostic dump
pub const DUMP_RULE_WIDTH: usize = 60;

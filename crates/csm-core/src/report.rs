// ── Run report ──
//
// Structured end-of-run summary. Every targeted network and every touched
// node gets one outcome line, so a partially committed run can be
// reconciled against the backup directory without re-deriving state.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::allocator::NetworkAllocation;
use crate::config::RetrofitMode;
use crate::plan::{Conflict, EntityChange};

/// Orchestrator state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RunPhase {
    Idle,
    Discovering,
    Planning,
    Validating,
    DryRunHalt,
    Committing,
    Reporting,
    Done,
    Failed,
}

/// What happened to one network or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutcomeStatus {
    /// Dry run: would have been written.
    WouldApply,
    Applied,
    /// Nothing to write.
    Unchanged,
    /// Not attempted because an earlier write failed.
    Skipped,
    Failed,
    /// The network could not be planned.
    PlanningFailed,
    /// Remove target missing from SLS.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkOutcome {
    pub network: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub xname: String,
    pub networks: Vec<String>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    /// Phase the run was in when it failed.
    pub phase: RunPhase,
    pub message: String,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RetrofitMode,
    /// `false` for a dry run.
    pub committed: bool,
    /// Final phase: `done` or `failed`.
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub networks: Vec<NetworkOutcome>,
    pub nodes: Vec<NodeOutcome>,
    /// Carved prefixes per network (add mode).
    pub allocations: Vec<NetworkAllocation>,
    pub changes: Vec<EntityChange>,
    pub conflicts: Vec<Conflict>,
    pub backup_dir: PathBuf,
    pub backups: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(mode: RetrofitMode, committed: bool, backup_dir: PathBuf) -> Self {
        Self {
            mode,
            committed,
            phase: RunPhase::Idle,
            failure: None,
            networks: Vec::new(),
            nodes: Vec::new(),
            allocations: Vec::new(),
            changes: Vec::new(),
            conflicts: Vec::new(),
            backup_dir,
            backups: Vec::new(),
        }
    }

    /// Whether any existing IPv6 data was left in place.
    pub fn conflicts_skipped(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.phase == RunPhase::Done
    }

    /// Phase of the failure, if any.
    pub fn failed_phase(&self) -> Option<RunPhase> {
        self.failure.as_ref().map(|f| f.phase)
    }

    pub fn network_status(&self, network: &str) -> Option<OutcomeStatus> {
        self.networks
            .iter()
            .find(|n| n.network.eq_ignore_ascii_case(network))
            .map(|n| n.status)
    }

    pub fn node_status(&self, xname: &str) -> Option<OutcomeStatus> {
        self.nodes.iter().find(|n| n.xname == xname).map(|n| n.status)
    }

    /// Count of outcomes (networks and nodes) with `status`.
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.networks.iter().filter(|n| n.status == status).count()
            + self.nodes.iter().filter(|n| n.status == status).count()
    }
}

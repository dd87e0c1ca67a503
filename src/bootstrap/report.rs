//! Run report - what happened on which node
//!
//! Every step the orchestrator attempts is recorded with its node, outcome and
//! duration so a failed run can be diagnosed without re-running it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::BootstrapError;
use crate::cluster::Role;

/// Steps applied to each node, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    OpenSession,
    AppendHosts,
    WriteIdentity,
    /// Ensemble entry for the given member
    PatchEnsemble(Role),
    PatchLocator,
    AuthorizeIngress,
    RestartEnsemble,
    RestartHa,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::OpenSession => f.write_str("open-session"),
            Step::AppendHosts => f.write_str("append-hosts"),
            Step::WriteIdentity => f.write_str("write-identity"),
            Step::PatchEnsemble(member) => write!(f, "patch-ensemble-{}", member.position()),
            Step::PatchLocator => f.write_str("patch-locator"),
            Step::AuthorizeIngress => f.write_str("authorize-ingress"),
            Step::RestartEnsemble => f.write_str("restart-zookeeper"),
            Step::RestartHa => f.write_str("restart-ha"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    Succeeded,
    Failed { error: String },
}

/// One attempted step on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub role: Role,
    pub step: Step,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == StepOutcome::Succeeded
    }
}

/// Where a node reports its HA status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUrl {
    pub role: Role,
    pub url: String,
}

/// Outcome of one orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: u64,
    pub records: Vec<StepRecord>,
    /// Filled only when every node succeeded
    pub status_urls: Vec<StatusUrl>,
    #[serde(skip)]
    pub failure: Option<BootstrapError>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: now(),
            records: Vec::new(),
            status_urls: Vec::new(),
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Records for one node, in application order
    pub fn records_for(&self, role: Role) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter(move |r| r.role == role)
    }

    /// First failed step, if any
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| !r.succeeded())
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

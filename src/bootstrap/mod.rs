//! Cluster bootstrap - resolve, plan, apply
//!
//! A run:
//! 1. Queries the inventory and binds one instance to each role
//! 2. Builds the `ClusterPlan` (fails before any remote work if a role is
//!    unresolved)
//! 3. Applies the plan node by node in role order, recording every step
//! 4. Reports a status URL per node
//!
//! The first failed step aborts the run. Nothing is rolled back.

pub mod cli;
pub mod plan;
pub mod report;
pub mod status;

use std::time::Instant;
use tracing::{error, info, Instrument};

use crate::cluster::{self, ClassificationError, Instance, InventoryError, InventorySource, Role, RoleMap};
use crate::firewall::{Firewall, FirewallError};
use crate::remote::{CommandOutput, RemoteError, RemoteExecutor, RemoteSession};

pub use plan::{ClusterPlan, NodeAction, NodePlan, PlanSettings};
pub use report::{RunReport, StatusUrl, Step, StepOutcome, StepRecord};

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepFailure {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),
}

/// Bootstrap errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("Node {role} ({host}) failed at step {step}: {source}")]
    Node {
        role: Role,
        host: String,
        step: Step,
        #[source]
        source: StepFailure,
    },
}

/// Drives a bootstrap run against its collaborators
pub struct Orchestrator {
    inventory: Box<dyn InventorySource>,
    executor: Box<dyn RemoteExecutor>,
    firewall: Box<dyn Firewall>,
    settings: PlanSettings,
    parallel: bool,
}

impl Orchestrator {
    pub fn new(
        inventory: Box<dyn InventorySource>,
        executor: Box<dyn RemoteExecutor>,
        firewall: Box<dyn Firewall>,
        settings: PlanSettings,
    ) -> Self {
        Self {
            inventory,
            executor,
            firewall,
            settings,
            parallel: false,
        }
    }

    /// Configure the three nodes concurrently instead of one after another
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Bind one running instance to every role
    pub async fn resolve(&self) -> Result<RoleMap<Instance>, BootstrapError> {
        let instances = self.inventory.running_instances().await?;
        let assignment = cluster::resolve(&instances, &self.settings.names);

        info!(
            instances = instances.len(),
            bound = assignment.len(),
            "Inventory classified"
        );

        Ok(assignment.complete(&self.settings.names)?)
    }

    /// Resolve and build the plan without touching any node
    pub async fn plan(&self) -> Result<ClusterPlan, BootstrapError> {
        let nodes = self.resolve().await?;
        Ok(ClusterPlan::build(&nodes, &self.settings))
    }

    /// Run the bootstrap end to end
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new();
        let span = tracing::info_span!("bootstrap", run_id = %report.run_id);

        async {
            let plan = match self.plan().await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(error = %e, "Planning failed, no node was touched");
                    report.failure = Some(e);
                    return;
                }
            };

            for (role, address) in plan.addresses.iter() {
                info!(role = %role, address = %address, "Role resolved");
            }

            let failure = if self.parallel {
                self.apply_parallel(&plan, &mut report.records).await
            } else {
                self.apply_sequential(&plan, &mut report.records).await
            };

            match failure {
                Some(e) => {
                    error!(error = %e, "Bootstrap aborted");
                    report.failure = Some(e);
                }
                None => {
                    report.status_urls = plan.status_urls();
                    info!("Bootstrap complete on all nodes");
                }
            }
        }
        .instrument(span)
        .await;

        report
    }

    async fn apply_sequential(
        &self,
        plan: &ClusterPlan,
        records: &mut Vec<StepRecord>,
    ) -> Option<BootstrapError> {
        for role in Role::ALL {
            if let Err(e) = self.apply_node(plan, role, records).await {
                return Some(e);
            }
        }
        None
    }

    /// Nodes run concurrently; steps within a node stay ordered. The first
    /// failure drops the remaining node pipelines, killing any in-flight
    /// command. Steps finished before that point stay recorded.
    async fn apply_parallel(
        &self,
        plan: &ClusterPlan,
        records: &mut Vec<StepRecord>,
    ) -> Option<BootstrapError> {
        let mut node_records: [Vec<StepRecord>; 3] = Default::default();

        let runs = node_records
            .iter_mut()
            .zip(Role::ALL)
            .map(|(node_records, role)| self.apply_node(plan, role, node_records));
        let result = futures::future::try_join_all(runs).await;

        for node_records in node_records {
            records.extend(node_records);
        }
        result.err()
    }

    async fn apply_node(
        &self,
        plan: &ClusterPlan,
        role: Role,
        records: &mut Vec<StepRecord>,
    ) -> Result<(), BootstrapError> {
        let node = plan.nodes.get(role);
        let host = node.target.host.to_string();
        info!(role = %role, host = %host, identity = node.identity, "Configuring node");

        let mut session: Box<dyn RemoteSession> = record(
            records,
            role,
            &host,
            Step::OpenSession,
            self.executor.open(&node.target),
        )
        .await?;

        for (step, action) in plan.node_actions(role) {
            match action {
                NodeAction::Remote(command) => {
                    let run = async {
                        session
                            .run(&command)
                            .await
                            .and_then(CommandOutput::ensure_success)
                    };
                    record(records, role, &host, step, run).await?;
                }
                NodeAction::Authorize(rule) => {
                    record(records, role, &host, step, self.firewall.authorize_ingress(&rule)).await?;
                }
            }
        }

        info!(role = %role, host = %host, "Node configured");
        Ok(())
    }
}

/// Await one step, append its record and lift a failure into `BootstrapError`
async fn record<T, E, F>(
    records: &mut Vec<StepRecord>,
    role: Role,
    host: &str,
    step: Step,
    fut: F,
) -> Result<T, BootstrapError>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: Into<StepFailure>,
{
    let start = Instant::now();
    let result = fut.await.map_err(Into::into);
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(value) => {
            info!(role = %role, step = %step, duration_ms, "Step succeeded");
            records.push(StepRecord {
                role,
                step,
                outcome: StepOutcome::Succeeded,
                duration_ms,
            });
            Ok(value)
        }
        Err(source) => {
            error!(role = %role, step = %step, duration_ms, error = %source, "Step failed");
            records.push(StepRecord {
                role,
                step,
                outcome: StepOutcome::Failed {
                    error: source.to_string(),
                },
                duration_ms,
            });
            Err(BootstrapError::Node {
                role,
                host: host.to_string(),
                step,
                source,
            })
        }
    }
}

//! Bootstrap CLI - subcommands and console output
//!
//! Formatting lives here so the orchestrator itself only returns values.

use clap::Subcommand;
use std::time::Duration;

use super::status::{StatusCheck, StatusChecker};
use super::{BootstrapError, ClusterPlan, NodeAction, Orchestrator, RunReport, StepOutcome};
use crate::cluster::{Instance, RoleMap};

/// Bootstrap CLI commands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Configure all three nodes and restart their services
    Run,

    /// Print every command the run would issue, per node
    Plan,

    /// Show which instance is bound to each role
    Resolve,

    /// Wait for every node's status endpoint to answer
    Status,
}

/// Execute a CLI command and return its console output
pub async fn execute_command(
    orchestrator: &Orchestrator,
    command: Commands,
    status_timeout: Duration,
    poll_interval: Duration,
) -> Result<String, BootstrapError> {
    match command {
        Commands::Run => {
            let report = orchestrator.run().await;
            let output = format_report(&report);
            match report.failure {
                Some(e) => {
                    println!("{}", output);
                    Err(e)
                }
                None => Ok(output),
            }
        }

        Commands::Plan => {
            let plan = orchestrator.plan().await?;
            Ok(format_plan(&plan))
        }

        Commands::Resolve => {
            let nodes = orchestrator.resolve().await?;
            Ok(format_assignment(&nodes))
        }

        Commands::Status => {
            let plan = orchestrator.plan().await?;
            let checker = StatusChecker::new(status_timeout, poll_interval);
            let checks = checker.wait_until_up(&plan.status_urls()).await;
            Ok(format_status(&checks))
        }
    }
}

/// Format the role table
pub fn format_assignment(nodes: &RoleMap<Instance>) -> String {
    let mut output = String::new();
    output.push_str("Role Assignment\n");
    output.push_str("===============\n\n");

    for (role, instance) in nodes.iter() {
        output.push_str(&format!(
            "{}  {:<20} {:<16} {:<16} {}\n",
            role,
            instance.id,
            instance.private_address,
            instance
                .public_address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            instance.name.as_deref().unwrap_or(""),
        ));
    }

    output
}

/// Format a plan for review
pub fn format_plan(plan: &ClusterPlan) -> String {
    let mut output = String::new();
    output.push_str("Bootstrap Plan\n");
    output.push_str("==============\n");

    for (role, node) in plan.nodes.iter() {
        output.push_str(&format!(
            "\n[{}] {} via {} (myid {})\n",
            role, node.target.instance_id, node.target.host, node.identity
        ));
        for (step, action) in plan.node_actions(role) {
            match action {
                NodeAction::Remote(command) => {
                    output.push_str(&format!("  {:<20} {}\n", step.to_string(), command.escape_debug()));
                }
                NodeAction::Authorize(rule) => {
                    output.push_str(&format!("  {:<20} {}\n", step.to_string(), rule));
                }
            }
        }
    }

    output
}

/// Format a run report
pub fn format_report(report: &RunReport) -> String {
    let mut output = String::new();

    if report.succeeded() {
        output.push_str(&format!("SUCCESS: bootstrap run {}\n", report.run_id));
    } else {
        output.push_str(&format!("FAILED: bootstrap run {}\n", report.run_id));
    }

    for record in &report.records {
        let mark = match &record.outcome {
            StepOutcome::Succeeded => "ok  ".to_string(),
            StepOutcome::Failed { error } => format!("FAIL {}", error),
        };
        output.push_str(&format!(
            "  [{}] {:<20} {:>6}ms {}\n",
            record.role,
            record.step.to_string(),
            record.duration_ms,
            mark
        ));
    }

    if let Some(failure) = &report.failure {
        output.push_str(&format!("\nError: {}\n", failure));
        output.push_str("Nothing was rolled back. Re-running appends the hosts block again.\n");
    }

    if !report.status_urls.is_empty() {
        output.push_str("\nThe hosts are now restarting, this may take several minutes.\n");
        output.push_str("Once back up, confirm status at:\n\n");
        for status in &report.status_urls {
            output.push_str(&format!("\t{}\n", status.url));
        }
    }

    output
}

/// Format status poll results
pub fn format_status(checks: &[StatusCheck]) -> String {
    let mut output = String::new();
    output.push_str("Node Status\n");
    output.push_str("===========\n\n");

    for check in checks {
        let state = if check.up { "UP  " } else { "DOWN" };
        output.push_str(&format!("[{}] {} {}", check.role, state, check.url));
        if let Some(error) = &check.last_error {
            output.push_str(&format!(" ({})", error));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{Step, StatusUrl, StepRecord};
    use crate::cluster::Role;

    #[test]
    fn test_format_report_lists_status_urls() {
        let mut report = RunReport::new();
        report.records.push(StepRecord {
            role: Role::A,
            step: Step::OpenSession,
            outcome: StepOutcome::Succeeded,
            duration_ms: 40,
        });
        report.status_urls.push(StatusUrl {
            role: Role::A,
            url: "http://54.0.0.1:9999/bigdata/status".to_string(),
        });

        let output = format_report(&report);
        assert!(output.starts_with("SUCCESS"));
        assert!(output.contains("open-session"));
        assert!(output.contains("\thttp://54.0.0.1:9999/bigdata/status\n"));
    }

    #[test]
    fn test_format_status() {
        let checks = vec![StatusCheck {
            role: Role::C,
            url: "http://54.0.0.3:9999/bigdata/status".to_string(),
            up: false,
            attempts: 4,
            last_error: Some("HTTP 503 Service Unavailable".to_string()),
        }];

        assert_eq!(
            format_status(&checks),
            "Node Status\n===========\n\n[C] DOWN http://54.0.0.3:9999/bigdata/status (HTTP 503 Service Unavailable)\n"
        );
    }
}

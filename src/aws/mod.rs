//! AWS adapters
//!
//! Inventory and security-group access go through the `aws` command line
//! client, which picks up credentials and region from the environment the
//! same way the rest of the operator tooling does.

pub mod ec2;
pub mod security_group;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub use ec2::Ec2Inventory;
pub use security_group::SecurityGroupFirewall;

/// Error codes the API returns for credential problems
const AUTH_ERROR_MARKERS: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "ExpiredToken",
    "Unable to locate credentials",
];

/// Invokes the `aws` CLI with JSON output
#[derive(Debug, Clone)]
pub struct AwsCli {
    cli_path: PathBuf,
    region: Option<String>,
    timeout: Duration,
}

impl AwsCli {
    pub fn new(cli_path: impl Into<PathBuf>, region: Option<String>, timeout: Duration) -> Self {
        Self {
            cli_path: cli_path.into(),
            region,
            timeout,
        }
    }

    /// Full argument list for an invocation
    pub fn args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if let Some(region) = &self.region {
            full.push("--region".to_string());
            full.push(region.clone());
        }
        full.push("--output".to_string());
        full.push("json".to_string());
        full
    }

    /// Run the CLI and return stdout of a successful invocation
    pub async fn run(&self, args: &[&str]) -> Result<String, AwsError> {
        let full = self.args(args);
        debug!(cli = %self.cli_path.display(), args = ?full, "Invoking aws cli");

        let mut command = Command::new(&self.cli_path);
        command
            .args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AwsError::Timeout(self.timeout))?
            .map_err(|e| AwsError::Spawn(format!("{}: {}", self.cli_path.display(), e)))?;

        if !output.status.success() {
            return Err(AwsError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// AWS CLI errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AwsError {
    #[error("Failed to start aws cli: {0}")]
    Spawn(String),

    #[error("aws cli timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("aws cli exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
}

impl AwsError {
    pub fn is_auth_failure(&self) -> bool {
        match self {
            AwsError::Failed { stderr, .. } => {
                AUTH_ERROR_MARKERS.iter().any(|marker| stderr.contains(marker))
            }
            _ => false,
        }
    }

    /// Stderr contains the given API error code
    pub fn has_code(&self, code: &str) -> bool {
        matches!(self, AwsError::Failed { stderr, .. } if stderr.contains(code))
    }
}

//! OpenSSH transport
//!
//! Each command is a separate `ssh` invocation in batch mode. Opening a
//! session runs a no-op check so unreachable nodes fail before any mutation
//! is attempted.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandOutput, RemoteError, RemoteExecutor, RemoteSession, RetryPolicy, SessionTarget};

/// ssh exits with 255 when the connection itself failed.
///
/// ssh gives no way to tell that apart from a remote command that exits 255
/// itself, or from a connection dropped after the command already ran. Both
/// are retried as connection failures, so a non-idempotent command such as
/// the hosts append can run twice.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Settings for the OpenSSH client
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Path to the `ssh` binary
    pub ssh_path: PathBuf,
    /// Login user on the nodes
    pub user: String,
    /// Private key passed with `-i`
    pub private_key: PathBuf,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Verify host keys against known_hosts
    pub strict_host_key_checking: bool,
    pub retry: RetryPolicy,
}

impl SshConfig {
    /// Argument list for running `command` on `host`
    pub fn args(&self, host: &str, command: &str) -> Vec<String> {
        let strict = if self.strict_host_key_checking { "yes" } else { "no" };
        vec![
            "-i".to_string(),
            self.private_key.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", strict),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("{}@{}", self.user, host),
            command.to_string(),
        ]
    }
}

/// Executor opening sessions through the `ssh` client
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for SshExecutor {
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut session = SshSession {
            config: self.config.clone(),
            target: target.clone(),
        };

        info!(role = %target.role, host = %target.host, "Opening ssh session");
        session.run("true").await?.ensure_success()?;

        Ok(Box::new(session))
    }
}

/// Session bound to one node
pub struct SshSession {
    config: SshConfig,
    target: SessionTarget,
}

impl SshSession {
    async fn run_once(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let host = self.target.host.to_string();
        let mut child = Command::new(&self.config.ssh_path);
        child
            .args(self.config.args(&host, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.command_timeout, child.output())
            .await
            .map_err(|_| RemoteError::Timeout(self.config.command_timeout))?
            .map_err(|e| RemoteError::Spawn(format!("{}: {}", self.config.ssh_path.display(), e)))?;

        // Killed by a signal: no exit code
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if status == SSH_CONNECTION_FAILURE {
            return Err(RemoteError::Connect {
                host: self.target.host,
                message: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { status, stdout, stderr })
    }
}

#[async_trait::async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, RemoteError> {
        debug!(role = %self.target.role, host = %self.target.host, command, "Running remote command");

        let retry = self.config.retry;
        let this = &*self;
        retry.retry(command, move || this.run_once(command)).await
    }
}

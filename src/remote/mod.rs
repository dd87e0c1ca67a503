//! Remote command execution
//!
//! A session is opened per node and runs shell commands one at a time,
//! blocking until each completes. Transports implement `RemoteExecutor`;
//! `ssh` drives the OpenSSH client, `recording` captures commands for dry
//! runs and tests.

pub mod recording;
pub mod ssh;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::warn;

use crate::cluster::Role;

pub use recording::{RecordedCommand, RecordingExecutor};
pub use ssh::{SshConfig, SshExecutor};

/// Node a session is opened against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTarget {
    pub role: Role,
    pub instance_id: String,
    /// Address the transport connects to
    pub host: Ipv4Addr,
}

/// Result of a completed remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turn a non-zero exit into `RemoteError::NonZeroExit`
    pub fn ensure_success(self) -> Result<Self, RemoteError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RemoteError::NonZeroExit {
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Opens sessions to nodes
#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// An open session on one node
#[async_trait::async_trait]
pub trait RemoteSession: Send {
    /// Run `command` and wait for it to finish
    async fn run(&mut self, command: &str) -> Result<CommandOutput, RemoteError>;
}

/// Remote execution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Failed to start remote transport: {0}")]
    Spawn(String),

    #[error("Connection to {host} failed: {message}")]
    Connect { host: Ipv4Addr, message: String },

    #[error("Command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Command exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
}

impl RemoteError {
    /// Only failures before the command reached the remote shell are retried
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Connect { .. })
    }
}

/// Bounded retry with exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub async fn retry<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient remote failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn connect_error() -> RemoteError {
        RemoteError::Connect {
            host: Ipv4Addr::new(10, 0, 0, 1),
            message: "Connection refused".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_ensure_success() {
        let ok = CommandOutput { status: 0, stdout: "done".into(), stderr: String::new() };
        assert!(ok.ensure_success().is_ok());

        let failed = CommandOutput { status: 2, stdout: String::new(), stderr: "no such file\n".into() };
        assert_eq!(
            failed.ensure_success().unwrap_err(),
            RemoteError::NonZeroExit { status: 2, stderr: "no such file".into() }
        );
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
        };
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = policy
            .retry("connect", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(connect_error())
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
        };
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = policy
            .retry("connect", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(connect_error())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_command_failures() {
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = RetryPolicy::default()
            .retry("command", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::NonZeroExit { status: 1, stderr: String::new() })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

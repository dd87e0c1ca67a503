//! Recording transport
//!
//! Captures every opened session and command instead of touching a node.
//! Backs `--dry-run` and the orchestrator tests. Failures can be injected per
//! role to exercise abort paths.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{CommandOutput, RemoteError, RemoteExecutor, RemoteSession, SessionTarget};
use crate::cluster::Role;

/// A command captured by the recording transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub role: Role,
    pub command: String,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    role: Role,
    /// Fail the first command containing this text; `None` fails `open`
    command_contains: Option<String>,
    error: RemoteError,
}

#[derive(Default)]
struct Journal {
    sessions: Vec<SessionTarget>,
    commands: Vec<RecordedCommand>,
}

/// Executor that records instead of executing. Clones share one journal.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    journal: Arc<Mutex<Journal>>,
    failures: Arc<Vec<InjectedFailure>>,
    echo: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log each command at info level as it is recorded
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Make `open` fail for `role`
    pub fn fail_open(self, role: Role, error: RemoteError) -> Self {
        self.with_failure(InjectedFailure {
            role,
            command_contains: None,
            error,
        })
    }

    /// Make the first command on `role` containing `needle` fail
    pub fn fail_command(self, role: Role, needle: impl Into<String>, error: RemoteError) -> Self {
        self.with_failure(InjectedFailure {
            role,
            command_contains: Some(needle.into()),
            error,
        })
    }

    fn with_failure(self, failure: InjectedFailure) -> Self {
        let mut failures: Vec<InjectedFailure> = self.failures.as_ref().clone();
        failures.push(failure);
        Self {
            failures: Arc::new(failures),
            ..self
        }
    }

    /// Sessions opened so far, in open order
    pub async fn sessions(&self) -> Vec<SessionTarget> {
        self.journal.lock().await.sessions.clone()
    }

    /// Every recorded command, in issue order
    pub async fn commands(&self) -> Vec<RecordedCommand> {
        self.journal.lock().await.commands.clone()
    }

    /// Commands recorded for one role
    pub async fn commands_for(&self, role: Role) -> Vec<String> {
        self.journal
            .lock()
            .await
            .commands
            .iter()
            .filter(|c| c.role == role)
            .map(|c| c.command.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, RemoteError> {
        if let Some(failure) = self
            .failures
            .iter()
            .find(|f| f.role == target.role && f.command_contains.is_none())
        {
            return Err(failure.error.clone());
        }

        self.journal.lock().await.sessions.push(target.clone());
        if self.echo {
            info!(role = %target.role, host = %target.host, "[dry-run] open session");
        }

        Ok(Box::new(RecordingSession {
            executor: self.clone(),
            target: target.clone(),
        }))
    }
}

struct RecordingSession {
    executor: RecordingExecutor,
    target: SessionTarget,
}

#[async_trait::async_trait]
impl RemoteSession for RecordingSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, RemoteError> {
        let failure = self.executor.failures.iter().find(|f| {
            f.role == self.target.role
                && f.command_contains
                    .as_deref()
                    .is_some_and(|needle| command.contains(needle))
        });
        if let Some(failure) = failure {
            return Err(failure.error.clone());
        }

        self.executor.journal.lock().await.commands.push(RecordedCommand {
            role: self.target.role,
            command: command.to_string(),
        });
        if self.executor.echo {
            info!(role = %self.target.role, host = %self.target.host, "[dry-run] {}", command);
        }

        Ok(CommandOutput {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

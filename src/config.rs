//! Bootstrap configuration
//!
//! Loaded from an optional TOML file; `main` layers CLI flags and
//! environment variables on top.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cluster::{Role, RoleMap, RoleNames};
use crate::patch::locator::default_placeholders;
use crate::remote::{RetryPolicy, SshConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name fragments identifying each role's instance
    #[serde(default = "default_role_names")]
    pub roles: RoleNames,

    /// Placeholder registrar addresses in the HA defaults file
    #[serde(default = "default_placeholders")]
    pub locator: RoleMap<Ipv4Addr>,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region passed to the CLI (falls back to the CLI's own configuration)
    #[serde(default)]
    pub region: Option<String>,

    /// Private security group granted node-to-node ingress
    #[serde(default)]
    pub security_group_id: Option<String>,

    /// Path to the `aws` binary
    #[serde(default = "default_aws_cli")]
    pub cli_path: PathBuf,

    /// Read instances from this JSON file instead of the EC2 API
    #[serde(default)]
    pub inventory_file: Option<PathBuf>,

    /// Timeout for a single CLI call
    #[serde(default = "default_aws_timeout")]
    pub timeout_secs: u64,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: None,
            security_group_id: None,
            cli_path: default_aws_cli(),
            inventory_file: None,
            timeout_secs: default_aws_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Login user on the nodes
    #[serde(default = "default_user")]
    pub user: String,

    /// Private key used for ssh authentication
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Path to the `ssh` binary
    #[serde(default = "default_ssh")]
    pub ssh_path: PathBuf,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound for any single remote command, restarts included
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Attempts per command on connection failure, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default)]
    pub strict_host_key_checking: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            private_key: None,
            ssh_path: default_ssh(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            strict_host_key_checking: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Configure the three nodes concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Record commands instead of executing them
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// HA service HTTP port
    #[serde(default = "default_status_port")]
    pub port: u16,

    #[serde(default = "default_status_path")]
    pub path: String,

    /// How long `status` waits for every node to answer
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            port: default_status_port(),
            path: default_status_path(),
            check_timeout_secs: default_check_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

// Defaults
fn default_role_names() -> RoleNames {
    RoleMap::new(
        "bigdataA".to_string(),
        "bigdataB".to_string(),
        "bigdataC".to_string(),
    )
}
fn default_aws_cli() -> PathBuf { PathBuf::from("aws") }
fn default_aws_timeout() -> u64 { 60 }
fn default_user() -> String { "ubuntu".to_string() }
fn default_ssh() -> PathBuf { PathBuf::from("ssh") }
fn default_connect_timeout() -> u64 { 10 }
fn default_command_timeout() -> u64 { 300 }
fn default_max_attempts() -> u32 { 5 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_status_port() -> u16 { 9999 }
fn default_status_path() -> String { "/bigdata/status".to_string() }
fn default_check_timeout() -> u64 { 600 }
fn default_poll_interval() -> u64 { 10 }

impl Default for Config {
    fn default() -> Self {
        Self {
            roles: default_role_names(),
            locator: default_placeholders(),
            aws: AwsConfig::default(),
            remote: RemoteConfig::default(),
            run: RunConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl Config {
    /// Read `path` if it exists, otherwise start from defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the settings a run depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (role, fragment) in self.roles.iter() {
            if fragment.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("name fragment for role {} is empty", role)));
            }
            if !fragment.chars().all(is_fragment_char) {
                return Err(ConfigError::Invalid(format!(
                    "name fragment {:?} for role {} may only contain letters, digits, '.', '_' and '-'",
                    fragment, role
                )));
            }
            if !seen.insert(fragment.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "name fragment {:?} is used by more than one role",
                    fragment
                )));
            }
        }

        let placeholders: HashSet<Ipv4Addr> = self.locator.iter().map(|(_, a)| *a).collect();
        if placeholders.len() != Role::ALL.len() {
            return Err(ConfigError::Invalid("locator placeholders must be distinct".to_string()));
        }

        if self.remote.max_attempts == 0 {
            return Err(ConfigError::Invalid("remote.max_attempts must be at least 1".to_string()));
        }

        if !self.run.dry_run {
            if self.aws.security_group_id.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Invalid(
                    "a private security group id is required (AWS_SECURITY_GROUP_PRIVATE)".to_string(),
                ));
            }
            if self.remote.private_key.is_none() {
                return Err(ConfigError::Invalid(
                    "an ssh private key is required (AWS_SSH_PRIVATE_KEY)".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.remote.max_attempts,
            initial_backoff: Duration::from_millis(self.remote.initial_backoff_ms),
        }
    }

    pub fn ssh_config(&self) -> Result<SshConfig, ConfigError> {
        let private_key = self
            .remote
            .private_key
            .clone()
            .ok_or_else(|| ConfigError::Invalid("no ssh private key configured".to_string()))?;

        Ok(SshConfig {
            ssh_path: self.remote.ssh_path.clone(),
            user: self.remote.user.clone(),
            private_key,
            connect_timeout: Duration::from_secs(self.remote.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.remote.command_timeout_secs),
            strict_host_key_checking: self.remote.strict_host_key_checking,
            retry: self.retry_policy(),
        })
    }
}

/// Fragments are embedded in single-quoted shell text and `|`-delimited sed
/// expressions on every node
fn is_fragment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> Config {
        let mut config = Config::default();
        config.aws.security_group_id = Some("sg-0123".to_string());
        config.remote.private_key = Some(PathBuf::from("/keys/cluster.pem"));
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.roles.a, "bigdataA");
        assert_eq!(config.locator.c, Ipv4Addr::new(33, 33, 33, 12));
        assert_eq!(config.status.port, 9999);
        assert_eq!(config.remote.user, "ubuntu");
        assert!(!config.run.parallel);
    }

    #[test]
    fn test_validate_requires_group_and_key() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        assert!(runnable().validate().is_ok());

        let mut dry = Config::default();
        dry.run.dry_run = true;
        assert!(dry.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_fragments() {
        let mut config = runnable();
        config.roles.c = config.roles.a.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than one role"));
    }

    #[test]
    fn test_validate_rejects_empty_fragment() {
        let mut config = runnable();
        config.roles.b = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shell_metacharacters() {
        for fragment in ["ha|A", "node's-B", "ha\"C", "ha\\A", "ha A", "ha\nA", "$(id)"] {
            let mut config = runnable();
            config.roles.a = fragment.to_string();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("may only contain"), "{:?} accepted", fragment);
        }

        let mut config = runnable();
        config.roles.a = "ha-node_A.1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ssh_config() {
        let ssh = runnable().ssh_config().unwrap();
        assert_eq!(ssh.private_key, PathBuf::from("/keys/cluster.pem"));
        assert_eq!(ssh.command_timeout, Duration::from_secs(300));
        assert_eq!(ssh.retry.max_attempts, 5);
    }
}

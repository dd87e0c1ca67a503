//! Firewall authorization
//!
//! Each node's private address is granted TCP ingress on the shared private
//! security group. Authorizations are additive, so their order across nodes
//! does not matter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Protocol of an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// A single-host ingress grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub group_id: String,
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub source: Ipv4Addr,
}

impl IngressRule {
    /// All TCP ports from one address
    pub fn all_tcp_from(group_id: impl Into<String>, source: Ipv4Addr) -> Self {
        Self {
            group_id: group_id.into(),
            protocol: Protocol::Tcp,
            from_port: 0,
            to_port: u16::MAX,
            source,
        }
    }

    /// Source as a single-host CIDR block
    pub fn cidr(&self) -> String {
        format!("{}/32", self.source)
    }

    pub fn port_range(&self) -> String {
        format!("{}-{}", self.from_port, self.to_port)
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> {}",
            self.group_id,
            self.protocol,
            self.port_range(),
            self.cidr()
        )
    }
}

/// Grants ingress on a security group
#[async_trait::async_trait]
pub trait Firewall: Send + Sync {
    /// Add `rule`. A rule that already exists counts as success.
    async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), FirewallError>;
}

/// Firewall errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FirewallError {
    #[error("Authorization rejected: {0}")]
    Rejected(String),

    #[error("Firewall API error: {0}")]
    Api(String),
}

/// Firewall that records rules instead of applying them
#[derive(Clone, Default)]
pub struct RecordingFirewall {
    rules: Arc<Mutex<Vec<IngressRule>>>,
    reject: Option<Ipv4Addr>,
    echo: bool,
}

impl RecordingFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log each rule at info level as it is recorded
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Reject any rule whose source is `address`
    pub fn rejecting(address: Ipv4Addr) -> Self {
        Self {
            reject: Some(address),
            ..Self::default()
        }
    }

    pub async fn rules(&self) -> Vec<IngressRule> {
        self.rules.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Firewall for RecordingFirewall {
    async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), FirewallError> {
        if self.reject == Some(rule.source) {
            return Err(FirewallError::Rejected(format!("{} not permitted", rule.cidr())));
        }

        if self.echo {
            info!(rule = %rule, "[dry-run] authorize ingress");
        }
        self.rules.lock().await.push(rule.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tcp_rule() {
        let rule = IngressRule::all_tcp_from("sg-123", Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(rule.cidr(), "10.0.1.2/32");
        assert_eq!(rule.port_range(), "0-65535");
        assert_eq!(rule.to_string(), "sg-123 tcp 0-65535 -> 10.0.1.2/32");
    }

    #[tokio::test]
    async fn test_recording_firewall() {
        let firewall = RecordingFirewall::rejecting(Ipv4Addr::new(10, 0, 1, 3));

        let ok = IngressRule::all_tcp_from("sg-1", Ipv4Addr::new(10, 0, 1, 1));
        let bad = IngressRule::all_tcp_from("sg-1", Ipv4Addr::new(10, 0, 1, 3));

        assert!(firewall.authorize_ingress(&ok).await.is_ok());
        assert!(matches!(
            firewall.authorize_ingress(&bad).await,
            Err(FirewallError::Rejected(_))
        ));
        assert_eq!(firewall.rules().await, vec![ok]);
    }
}

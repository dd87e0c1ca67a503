//! Security-group ingress via `authorize-security-group-ingress`

use tracing::{info, warn};

use super::AwsCli;
use crate::firewall::{Firewall, FirewallError, IngressRule};

/// Returned when the exact rule is already present
const DUPLICATE_RULE: &str = "InvalidPermission.Duplicate";

/// Firewall backed by an EC2 security group
pub struct SecurityGroupFirewall {
    cli: AwsCli,
}

impl SecurityGroupFirewall {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

/// CLI arguments for one ingress rule
pub fn authorize_args(rule: &IngressRule) -> Vec<String> {
    vec![
        "ec2".to_string(),
        "authorize-security-group-ingress".to_string(),
        "--group-id".to_string(),
        rule.group_id.clone(),
        "--protocol".to_string(),
        rule.protocol.to_string(),
        "--port".to_string(),
        rule.port_range(),
        "--cidr".to_string(),
        rule.cidr(),
    ]
}

#[async_trait::async_trait]
impl Firewall for SecurityGroupFirewall {
    async fn authorize_ingress(&self, rule: &IngressRule) -> Result<(), FirewallError> {
        let args = authorize_args(rule);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match self.cli.run(&args).await {
            Ok(_) => {
                info!(rule = %rule, "Ingress authorized");
                Ok(())
            }
            Err(e) if e.has_code(DUPLICATE_RULE) => {
                warn!(rule = %rule, "Ingress rule already present");
                Ok(())
            }
            Err(e) if e.is_auth_failure() => Err(FirewallError::Rejected(e.to_string())),
            Err(e) => Err(FirewallError::Api(e.to_string())),
        }
    }
}

//! EC2 inventory via `describe-instances`

use serde::Deserialize;
use std::net::Ipv4Addr;
use tracing::{debug, info};

use super::{AwsCli, AwsError};
use crate::cluster::{Instance, InstanceState, InventoryError, InventorySource};

const RUNNING_FILTER: &str = "Name=instance-state-name,Values=running";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    instance_id: String,
    private_ip_address: Option<Ipv4Addr>,
    public_ip_address: Option<Ipv4Addr>,
    state: Ec2State,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2State {
    name: InstanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

/// Parse `aws ec2 describe-instances` output into instance records.
///
/// Instances without a private address are dropped.
pub fn parse_describe_instances(json: &str) -> Result<Vec<Instance>, InventoryError> {
    let output: DescribeInstancesOutput =
        serde_json::from_str(json).map_err(|e| InventoryError::InvalidResponse(e.to_string()))?;

    let mut instances = Vec::new();
    for raw in output.reservations.into_iter().flat_map(|r| r.instances) {
        let Some(private_address) = raw.private_ip_address else {
            debug!(instance = %raw.instance_id, "Skipping instance without private address");
            continue;
        };

        let name = raw
            .tags
            .into_iter()
            .find(|tag| tag.key == "Name")
            .map(|tag| tag.value);

        instances.push(Instance {
            id: raw.instance_id,
            name,
            private_address,
            public_address: raw.public_ip_address,
            state: raw.state.name,
        });
    }

    Ok(instances)
}

/// Inventory backed by the EC2 API
pub struct Ec2Inventory {
    cli: AwsCli,
}

impl Ec2Inventory {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait::async_trait]
impl InventorySource for Ec2Inventory {
    async fn running_instances(&self) -> Result<Vec<Instance>, InventoryError> {
        let json = self
            .cli
            .run(&["ec2", "describe-instances", "--filters", RUNNING_FILTER])
            .await
            .map_err(|e: AwsError| {
                if e.is_auth_failure() {
                    InventoryError::Auth(e.to_string())
                } else {
                    InventoryError::Query(e.to_string())
                }
            })?;

        let instances = parse_describe_instances(&json)?;
        info!(count = instances.len(), "Fetched running instances");

        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Reservations": [
            {
                "Instances": [
                    {
                        "InstanceId": "i-0aaa",
                        "PrivateIpAddress": "10.0.1.1",
                        "PublicIpAddress": "54.1.1.1",
                        "State": {"Code": 16, "Name": "running"},
                        "Tags": [{"Key": "Env", "Value": "prod"}, {"Key": "Name", "Value": "bigdataA"}]
                    },
                    {
                        "InstanceId": "i-0bbb",
                        "PrivateIpAddress": "10.0.1.2",
                        "State": {"Code": 16, "Name": "running"}
                    }
                ]
            },
            {
                "Instances": [
                    {
                        "InstanceId": "i-0ccc",
                        "State": {"Code": 48, "Name": "terminated"},
                        "Tags": [{"Key": "Name", "Value": "bigdataC"}]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_describe_instances() {
        let instances = parse_describe_instances(SAMPLE).unwrap();
        assert_eq!(instances.len(), 2);

        assert_eq!(instances[0].id, "i-0aaa");
        assert_eq!(instances[0].name.as_deref(), Some("bigdataA"));
        assert_eq!(instances[0].public_address, Some(Ipv4Addr::new(54, 1, 1, 1)));
        assert!(instances[0].is_running());

        assert_eq!(instances[1].name, None);
        assert_eq!(instances[1].public_address, None);
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_describe_instances(r#"{"Reservations": []}"#).unwrap().is_empty());
        assert!(matches!(
            parse_describe_instances("not json"),
            Err(InventoryError::InvalidResponse(_))
        ));
    }
}

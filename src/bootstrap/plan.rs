//! Cluster plan - every mutation of a run, computed before any is applied
//!
//! The hosts fragment, ensemble substitutions and locator substitution are
//! identical for all nodes and built once. Per-node entries differ only in
//! identity, firewall source and session target.

use serde::Serialize;
use std::net::Ipv4Addr;

use super::report::{StatusUrl, Step};
use crate::cluster::{resolver::address_map, AddressMap, Instance, Role, RoleMap, RoleNames};
use crate::config::Config;
use crate::firewall::IngressRule;
use crate::patch;
use crate::remote::SessionTarget;

/// Inputs to planning that come from configuration
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub names: RoleNames,
    pub placeholders: RoleMap<Ipv4Addr>,
    pub security_group_id: String,
    pub status_port: u16,
    pub status_path: String,
}

impl PlanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            names: config.roles.clone(),
            placeholders: config.locator.clone(),
            security_group_id: config.aws.security_group_id.clone().unwrap_or_default(),
            status_port: config.status.port,
            status_path: config.status.path.clone(),
        }
    }
}

/// A single thing done to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    /// Shell command over the node's session
    Remote(String),
    /// Ingress grant on the private security group
    Authorize(IngressRule),
}

/// Everything specific to one node
#[derive(Debug, Clone, Serialize)]
pub struct NodePlan {
    pub role: Role,
    pub target: SessionTarget,
    /// Ensemble identity (`myid`)
    pub identity: u8,
    pub identity_command: String,
    pub ingress: IngressRule,
    pub status_url: String,
}

/// Complete plan for a run
#[derive(Debug, Clone, Serialize)]
pub struct ClusterPlan {
    pub addresses: AddressMap,
    pub hosts_fragment: String,
    pub hosts_command: String,
    pub ensemble_commands: RoleMap<String>,
    pub locator_command: String,
    pub nodes: RoleMap<NodePlan>,
}

impl ClusterPlan {
    pub fn build(instances: &RoleMap<Instance>, settings: &PlanSettings) -> Self {
        let addresses = address_map(instances);

        let hosts_fragment = patch::hosts_fragment(&addresses, &settings.names);
        let hosts_command = patch::hosts_append_command(&hosts_fragment);
        let ensemble_commands = patch::ensemble_substitutions(&addresses, &settings.names);
        let locator_command = patch::locator_substitution(&addresses, &settings.placeholders);

        let nodes = instances.map(|role, instance| NodePlan {
            role,
            target: SessionTarget {
                role,
                instance_id: instance.id.clone(),
                host: instance.reachable_address(),
            },
            identity: role.position(),
            identity_command: patch::identity_command(role.position()),
            ingress: IngressRule::all_tcp_from(&settings.security_group_id, instance.private_address),
            status_url: format!(
                "http://{}:{}{}",
                instance.reachable_address(),
                settings.status_port,
                settings.status_path
            ),
        });

        Self {
            addresses,
            hosts_fragment,
            hosts_command,
            ensemble_commands,
            locator_command,
            nodes,
        }
    }

    /// Actions for `role` after its session is open, in application order
    pub fn node_actions(&self, role: Role) -> Vec<(Step, NodeAction)> {
        let node = self.nodes.get(role);

        let mut actions = vec![
            (Step::AppendHosts, NodeAction::Remote(self.hosts_command.clone())),
            (Step::WriteIdentity, NodeAction::Remote(node.identity_command.clone())),
        ];
        for (member, command) in self.ensemble_commands.iter() {
            actions.push((Step::PatchEnsemble(member), NodeAction::Remote(command.clone())));
        }
        actions.push((Step::PatchLocator, NodeAction::Remote(self.locator_command.clone())));
        actions.push((Step::AuthorizeIngress, NodeAction::Authorize(node.ingress.clone())));
        actions.push((Step::RestartEnsemble, NodeAction::Remote(patch::restart_ensemble_command())));
        actions.push((Step::RestartHa, NodeAction::Remote(patch::restart_ha_command())));

        actions
    }

    pub fn status_urls(&self) -> Vec<StatusUrl> {
        self.nodes
            .iter()
            .map(|(role, node)| StatusUrl {
                role,
                url: node.status_url.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InstanceState;

    fn instances() -> RoleMap<Instance> {
        RoleMap::from_fn(|role| Instance {
            id: format!("i-{}", role.position()),
            name: Some(format!("cluster-{}-1", role)),
            private_address: Ipv4Addr::new(10, 0, 1, role.position()),
            public_address: Some(Ipv4Addr::new(54, 0, 0, role.position())),
            state: InstanceState::Running,
        })
    }

    fn settings() -> PlanSettings {
        PlanSettings {
            names: RoleMap::new("A".to_string(), "B".to_string(), "C".to_string()),
            placeholders: patch::locator::default_placeholders(),
            security_group_id: "sg-private".to_string(),
            status_port: 9999,
            status_path: "/bigdata/status".to_string(),
        }
    }

    #[test]
    fn test_node_plans() {
        let plan = ClusterPlan::build(&instances(), &settings());

        let identities: Vec<u8> = plan.nodes.iter().map(|(_, n)| n.identity).collect();
        assert_eq!(identities, vec![1, 2, 3]);

        let b = plan.nodes.get(Role::B);
        assert_eq!(b.target.host, Ipv4Addr::new(54, 0, 0, 2));
        assert_eq!(b.ingress.cidr(), "10.0.1.2/32");
        assert_eq!(b.ingress.group_id, "sg-private");
        assert_eq!(b.status_url, "http://54.0.0.2:9999/bigdata/status");
    }

    #[test]
    fn test_node_action_order() {
        let plan = ClusterPlan::build(&instances(), &settings());
        let steps: Vec<Step> = plan.node_actions(Role::C).into_iter().map(|(s, _)| s).collect();

        assert_eq!(
            steps,
            vec![
                Step::AppendHosts,
                Step::WriteIdentity,
                Step::PatchEnsemble(Role::A),
                Step::PatchEnsemble(Role::B),
                Step::PatchEnsemble(Role::C),
                Step::PatchLocator,
                Step::AuthorizeIngress,
                Step::RestartEnsemble,
                Step::RestartHa,
            ]
        );
    }

    #[test]
    fn test_shared_commands_identical_across_nodes() {
        let plan = ClusterPlan::build(&instances(), &settings());
        let shared = |role: Role| -> Vec<NodeAction> {
            plan.node_actions(role)
                .into_iter()
                .filter(|(s, _)| !matches!(s, Step::WriteIdentity | Step::AuthorizeIngress))
                .map(|(_, a)| a)
                .collect()
        };

        assert_eq!(shared(Role::A), shared(Role::B));
        assert_eq!(shared(Role::B), shared(Role::C));
    }
}

//! Role classification
//!
//! Binds running instances to roles by substring match of the role's name
//! fragment against the instance `Name` tag. Roles are tested A, B, C for each
//! instance and the first match wins. Once a role holds an instance, later
//! instances matching the same role are ignored.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{AddressMap, Instance, Role, RoleMap, RoleNames};

/// Instances bound to roles. Roles without a match are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleAssignment {
    bound: BTreeMap<Role, Instance>,
}

impl RoleAssignment {
    pub fn get(&self, role: Role) -> Option<&Instance> {
        self.bound.get(&role)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Roles with no bound instance, in role order
    pub fn missing(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| !self.bound.contains_key(role))
            .collect()
    }

    /// Require every role to be bound
    pub fn complete(mut self, names: &RoleNames) -> Result<RoleMap<Instance>, ClassificationError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ClassificationError {
                missing: missing
                    .into_iter()
                    .map(|role| (role, names.get(role).clone()))
                    .collect(),
            });
        }

        let mut take = |role: Role| {
            self.bound
                .remove(&role)
                .ok_or_else(|| ClassificationError { missing: vec![(role, names.get(role).clone())] })
        };
        let a = take(Role::A)?;
        let b = take(Role::B)?;
        let c = take(Role::C)?;

        Ok(RoleMap::new(a, b, c))
    }
}

/// One or more roles have no running instance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No running instance matches {}", describe_missing(.missing))]
pub struct ClassificationError {
    /// `(role, name fragment)` for every unresolved role
    pub missing: Vec<(Role, String)>,
}

fn describe_missing(missing: &[(Role, String)]) -> String {
    let roles: Vec<String> = missing
        .iter()
        .map(|(role, fragment)| format!("{} (name contains {:?})", role, fragment))
        .collect();
    let noun = if missing.len() > 1 { "roles" } else { "role" };
    format!("{} {}", noun, roles.join(", "))
}

/// Classify instances into roles.
///
/// Instances that are not running or have no `Name` tag are skipped. An
/// instance whose name contains more than one fragment takes the earliest
/// role in role order.
pub fn resolve(instances: &[Instance], names: &RoleNames) -> RoleAssignment {
    let mut assignment = RoleAssignment::default();

    for instance in instances {
        if !instance.is_running() {
            continue;
        }

        let Some(tag) = instance.name.as_deref() else {
            continue;
        };

        let Some(role) = Role::ALL
            .into_iter()
            .find(|role| tag.contains(names.get(*role).as_str()))
        else {
            continue;
        };

        if let Some(existing) = assignment.bound.get(&role) {
            warn!(
                role = %role,
                kept = %existing.id,
                ignored = %instance.id,
                "Multiple instances match role, keeping the first"
            );
            continue;
        }

        debug!(
            role = %role,
            instance = %instance.id,
            name = tag,
            private_address = %instance.private_address,
            "Instance bound to role"
        );
        assignment.bound.insert(role, instance.clone());
    }

    assignment
}

/// Private address of every node
pub fn address_map(nodes: &RoleMap<Instance>) -> AddressMap {
    nodes.map(|_, instance| instance.private_address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InstanceState;
    use std::net::Ipv4Addr;

    fn instance(id: &str, name: &str, last_octet: u8) -> Instance {
        Instance {
            id: id.to_string(),
            name: Some(name.to_string()),
            private_address: Ipv4Addr::new(10, 0, 1, last_octet),
            public_address: Some(Ipv4Addr::new(54, 0, 0, last_octet)),
            state: InstanceState::Running,
        }
    }

    fn names() -> RoleNames {
        RoleMap::new("A".to_string(), "B".to_string(), "C".to_string())
    }

    #[test]
    fn test_one_match_per_role() {
        let instances = vec![
            instance("i-3", "cluster-C-1", 3),
            instance("i-1", "cluster-A-1", 1),
            instance("i-2", "cluster-B-1", 2),
        ];

        let assignment = resolve(&instances, &names());
        assert_eq!(assignment.len(), 3);

        let nodes = assignment.complete(&names()).unwrap();
        let addresses = address_map(&nodes);
        assert_eq!(addresses.a, Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(addresses.b, Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(addresses.c, Ipv4Addr::new(10, 0, 1, 3));
    }

    #[test]
    fn test_unmatched_and_untagged_ignored() {
        let mut untagged = instance("i-9", "", 9);
        untagged.name = None;
        let instances = vec![instance("i-8", "bastion", 8), untagged, instance("i-1", "cluster-A-1", 1)];

        let assignment = resolve(&instances, &names());
        assert_eq!(assignment.len(), 1);
        assert_eq!(assignment.missing(), vec![Role::B, Role::C]);
    }

    #[test]
    fn test_first_match_wins_per_role() {
        let instances = vec![instance("i-1", "cluster-A-1", 1), instance("i-4", "cluster-A-2", 4)];

        let assignment = resolve(&instances, &names());
        assert_eq!(assignment.get(Role::A).map(|i| i.id.as_str()), Some("i-1"));
    }

    #[test]
    fn test_ambiguous_name_takes_earliest_role() {
        let instances = vec![instance("i-1", "cluster-B-and-C", 1)];

        let assignment = resolve(&instances, &names());
        assert_eq!(assignment.get(Role::B).map(|i| i.id.as_str()), Some("i-1"));
        assert!(assignment.get(Role::C).is_none());
    }

    #[test]
    fn test_stopped_instances_skipped() {
        let mut stopped = instance("i-1", "cluster-A-1", 1);
        stopped.state = InstanceState::Stopped;

        let assignment = resolve(&[stopped], &names());
        assert!(assignment.is_empty());
    }

    #[test]
    fn test_complete_reports_every_missing_role() {
        let instances = vec![instance("i-1", "cluster-A-1", 1)];

        let err = resolve(&instances, &names()).complete(&names()).unwrap_err();
        assert_eq!(
            err.missing,
            vec![(Role::B, "B".to_string()), (Role::C, "C".to_string())]
        );
        assert_eq!(
            err.to_string(),
            "No running instance matches roles B (name contains \"B\"), C (name contains \"C\")"
        );
    }

    #[test]
    fn test_single_missing_role_message() {
        let err = ClassificationError {
            missing: vec![(Role::A, "bigdataA".to_string())],
        };
        assert_eq!(
            err.to_string(),
            "No running instance matches role A (name contains \"bigdataA\")"
        );
        let source: &dyn std::error::Error = &err;
        assert!(source.source().is_none());
    }
}

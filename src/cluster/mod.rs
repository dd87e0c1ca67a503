//! Cluster topology - the three fixed roles and the instances bound to them
//!
//! Handles:
//! - The closed `Role` set (A, B, C) and its fixed order
//! - `RoleMap`, a total mapping from every role to a value
//! - Instance records as reported by the inventory
//! - Classifying instances into roles (see `resolver`)

pub mod inventory;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub use inventory::{FileInventory, InventoryError, InventorySource};
pub use resolver::{resolve, ClassificationError, RoleAssignment};

/// Number of nodes in the cluster. The topology is not resizable.
pub const CLUSTER_SIZE: usize = 3;

/// One of the three fixed logical positions in the cluster.
///
/// The declaration order is the role order: it drives identity assignment
/// (`myid`), ensemble positions and the order nodes are configured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    A,
    B,
    C,
}

impl Role {
    /// All roles in role order
    pub const ALL: [Role; CLUSTER_SIZE] = [Role::A, Role::B, Role::C];

    /// Zero-based index in role order
    pub fn index(self) -> usize {
        match self {
            Role::A => 0,
            Role::B => 1,
            Role::C => 2,
        }
    }

    /// 1-based ensemble position, also the node's `myid`
    pub fn position(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::A => "A",
            Role::B => "B",
            Role::C => "C",
        };
        f.write_str(label)
    }
}

/// A value for every role, iterated in role order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMap<T> {
    pub a: T,
    pub b: T,
    pub c: T,
}

impl<T> RoleMap<T> {
    pub fn new(a: T, b: T, c: T) -> Self {
        Self { a, b, c }
    }

    /// Build a map by evaluating `f` once per role, in role order
    pub fn from_fn(mut f: impl FnMut(Role) -> T) -> Self {
        let a = f(Role::A);
        let b = f(Role::B);
        let c = f(Role::C);
        Self { a, b, c }
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::A => &self.a,
            Role::B => &self.b,
            Role::C => &self.c,
        }
    }

    /// Iterate `(role, value)` pairs in role order
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        Role::ALL.into_iter().map(move |role| (role, self.get(role)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Role, &T) -> U) -> RoleMap<U> {
        RoleMap::from_fn(|role| f(role, self.get(role)))
    }
}

/// Name fragments identifying each role's instance by its `Name` tag
pub type RoleNames = RoleMap<String>;

/// Resolved private address per role
pub type AddressMap = RoleMap<Ipv4Addr>;

/// Lifecycle state reported by the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    #[serde(other)]
    Unknown,
}

/// A compute instance as seen by the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider instance id (e.g. `i-0abc...`)
    pub id: String,
    /// Value of the `Name` tag, if any
    #[serde(default)]
    pub name: Option<String>,
    pub private_address: Ipv4Addr,
    #[serde(default)]
    pub public_address: Option<Ipv4Addr>,
    pub state: InstanceState,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Address operators reach the node on: public if assigned, else private
    pub fn reachable_address(&self) -> Ipv4Addr {
        self.public_address.unwrap_or(self.private_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order_and_positions() {
        assert!(Role::A < Role::B && Role::B < Role::C);
        let positions: Vec<u8> = Role::ALL.iter().map(|r| r.position()).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_role_map_iterates_in_role_order() {
        let map = RoleMap::new("x", "y", "z");
        let pairs: Vec<_> = map.iter().map(|(r, v)| (r, *v)).collect();
        assert_eq!(pairs, vec![(Role::A, "x"), (Role::B, "y"), (Role::C, "z")]);
    }

    #[test]
    fn test_reachable_address_prefers_public() {
        let mut instance = Instance {
            id: "i-1".to_string(),
            name: Some("node".to_string()),
            private_address: Ipv4Addr::new(10, 0, 0, 1),
            public_address: Some(Ipv4Addr::new(54, 1, 2, 3)),
            state: InstanceState::Running,
        };
        assert_eq!(instance.reachable_address(), Ipv4Addr::new(54, 1, 2, 3));

        instance.public_address = None;
        assert_eq!(instance.reachable_address(), Ipv4Addr::new(10, 0, 0, 1));
    }
}

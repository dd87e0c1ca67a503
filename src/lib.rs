//! ha-bootstrap: network bootstrap for a three-node HA cluster on EC2
//!
//! Finds the three role instances by `Name` tag, then pushes the address
//! mapping to every node:
//! - `/etc/hosts` entries for each role
//! - ZooKeeper `myid` and ensemble membership in `zoo.cfg`
//! - Service-registrar locators in the HA defaults file
//! - Node-to-node ingress on the private security group
//! - Restarts of ZooKeeper and the HA service

pub mod aws;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod firewall;
pub mod patch;
pub mod remote;

pub use bootstrap::{BootstrapError, ClusterPlan, Orchestrator, PlanSettings, RunReport};
pub use cluster::{Instance, Role, RoleMap};
pub use config::Config;

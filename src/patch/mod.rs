//! Configuration patches - remote command rendering
//!
//! Every mutation applied to a node is a shell command string run over the
//! remote channel. This module renders them; nothing here performs I/O.

pub mod ensemble;
pub mod hosts;
pub mod locator;

pub use ensemble::{ensemble_substitution, ensemble_substitutions};
pub use hosts::{hosts_append_command, hosts_fragment};
pub use locator::locator_substitution;

/// Name resolution file the hosts fragment is appended to
pub const HOSTS_FILE: &str = "/etc/hosts";

/// ZooKeeper identity file (`myid`)
pub const ENSEMBLE_ID_FILE: &str = "/var/lib/zookeeper/myid";

/// ZooKeeper ensemble configuration
pub const ENSEMBLE_CONFIG_FILE: &str = "/etc/zookeeper/conf/zoo.cfg";

/// HA service defaults holding the service-registrar locators
pub const LOCATOR_CONFIG_FILE: &str = "/etc/default/bigdataHA";

/// Init script of the consensus service
pub const ENSEMBLE_SERVICE: &str = "/etc/init.d/zookeeper-server";

/// Init script of the HA application
pub const HA_SERVICE: &str = "/etc/init.d/bigdataHA";

/// In-place `sed` substitution of `from` with `to` in `file`, run as root.
///
/// `|` is the delimiter so addresses and `=` need no escaping.
pub(crate) fn sed_in_place(from: &str, to: &str, file: &str) -> String {
    format!("sudo sed -i 's|{}|{}|' {}", from, to, file)
}

/// Write the node's ensemble identity
pub fn identity_command(position: u8) -> String {
    format!("sudo sh -c 'echo {} > {}'", position, ENSEMBLE_ID_FILE)
}

/// Restart the consensus service
pub fn restart_ensemble_command() -> String {
    format!("sudo {} restart", ENSEMBLE_SERVICE)
}

/// Restart the HA application
pub fn restart_ha_command() -> String {
    format!("sudo {} restart", HA_SERVICE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_command() {
        assert_eq!(identity_command(2), "sudo sh -c 'echo 2 > /var/lib/zookeeper/myid'");
    }

    #[test]
    fn test_restart_commands() {
        assert_eq!(restart_ensemble_command(), "sudo /etc/init.d/zookeeper-server restart");
        assert_eq!(restart_ha_command(), "sudo /etc/init.d/bigdataHA restart");
    }
}

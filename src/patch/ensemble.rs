//! Ensemble membership patches for `zoo.cfg`
//!
//! The template config names members by role fragment
//! (`server.2=haB`). Each node gets all three substitutions since every
//! member carries the same ensemble list.

use std::net::Ipv4Addr;

use crate::cluster::{AddressMap, RoleMap, RoleNames};

use super::{sed_in_place, ENSEMBLE_CONFIG_FILE};

/// Rewrite `server.<position>=<fragment>` to `server.<position>=<address>`
pub fn ensemble_substitution(position: u8, fragment: &str, address: Ipv4Addr) -> String {
    sed_in_place(
        &format!("server.{}={}", position, fragment),
        &format!("server.{}={}", position, address),
        ENSEMBLE_CONFIG_FILE,
    )
}

/// One substitution per role, positions 1..=3 in role order
pub fn ensemble_substitutions(addresses: &AddressMap, names: &RoleNames) -> RoleMap<String> {
    addresses.map(|role, address| ensemble_substitution(role.position(), names.get(role), *address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_substitution() {
        assert_eq!(
            ensemble_substitution(2, "B", Ipv4Addr::new(10, 0, 0, 5)),
            "sudo sed -i 's|server.2=B|server.2=10.0.0.5|' /etc/zookeeper/conf/zoo.cfg"
        );
    }

    #[test]
    fn test_positions_follow_role_order() {
        let addresses = RoleMap::new(
            Ipv4Addr::new(10, 0, 1, 1),
            Ipv4Addr::new(10, 0, 1, 2),
            Ipv4Addr::new(10, 0, 1, 3),
        );
        let names = RoleMap::new("A".to_string(), "B".to_string(), "C".to_string());

        let commands = ensemble_substitutions(&addresses, &names);
        assert!(commands.a.contains("s|server.1=A|server.1=10.0.1.1|"));
        assert!(commands.b.contains("s|server.2=B|server.2=10.0.1.2|"));
        assert!(commands.c.contains("s|server.3=C|server.3=10.0.1.3|"));
    }
}

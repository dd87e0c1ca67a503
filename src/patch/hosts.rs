//! Hosts fragment
//!
//! Maps each role's name fragment to the node's private address so the
//! ensemble can address peers by name. Appended, never merged: running the
//! bootstrap twice leaves two copies in `/etc/hosts`.

use crate::cluster::{AddressMap, RoleNames};

use super::HOSTS_FILE;

/// Render the hosts block: a leading newline, then one
/// `<address>\t<fragment>\n` line per role in role order.
pub fn hosts_fragment(addresses: &AddressMap, names: &RoleNames) -> String {
    let mut fragment = String::from("\n");
    for (role, address) in addresses.iter() {
        fragment.push_str(&format!("{}\t{}\n", address, names.get(role)));
    }
    fragment
}

/// Command appending `fragment` to the hosts file
pub fn hosts_append_command(fragment: &str) -> String {
    format!("sudo sh -c 'echo \"{}\" >> {}'", fragment, HOSTS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::RoleMap;
    use std::net::Ipv4Addr;

    fn names() -> RoleNames {
        RoleMap::new("haA".to_string(), "haB".to_string(), "haC".to_string())
    }

    #[test]
    fn test_fragment_lines_in_role_order() {
        let addresses = RoleMap::new(
            Ipv4Addr::new(10, 0, 1, 1),
            Ipv4Addr::new(10, 0, 1, 2),
            Ipv4Addr::new(10, 0, 1, 3),
        );

        let fragment = hosts_fragment(&addresses, &names());
        assert_eq!(fragment, "\n10.0.1.1\thaA\n10.0.1.2\thaB\n10.0.1.3\thaC\n");

        let lines: Vec<&str> = fragment.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            assert_eq!(line.split('\t').count(), 2);
        }
    }

    #[test]
    fn test_append_command() {
        let command = hosts_append_command("\n10.0.1.1\thaA\n");
        assert_eq!(command, "sudo sh -c 'echo \"\n10.0.1.1\thaA\n\" >> /etc/hosts'");
    }
}

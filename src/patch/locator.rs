//! Service-registrar locator patch for the HA defaults file
//!
//! The packaged defaults list three placeholder registrar addresses. Each is
//! paired with a role and rewritten to that role's private address. Pairing
//! is by role, so the order addresses were discovered in does not matter.

use std::net::Ipv4Addr;

use crate::cluster::{AddressMap, RoleMap};

use super::{sed_in_place, LOCATOR_CONFIG_FILE};

/// Placeholder registrar addresses shipped in the packaged defaults
pub fn default_placeholders() -> RoleMap<Ipv4Addr> {
    RoleMap::new(
        Ipv4Addr::new(33, 33, 33, 10),
        Ipv4Addr::new(33, 33, 33, 11),
        Ipv4Addr::new(33, 33, 33, 12),
    )
}

/// Single compound command: one substitution per role, `;`-joined
pub fn locator_substitution(addresses: &AddressMap, placeholders: &RoleMap<Ipv4Addr>) -> String {
    addresses
        .iter()
        .map(|(role, address)| {
            sed_in_place(
                &placeholders.get(role).to_string(),
                &address.to_string(),
                LOCATOR_CONFIG_FILE,
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

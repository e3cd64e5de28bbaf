//! Network interface model
//!
//! One static interface per MAC address. Every network-config renderer walks
//! the interfaces in MAC order so the generic, EC2, GCE and OpenStack
//! documents enumerate the same interfaces in the same order.

pub mod render;
pub mod v1;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Static address configuration for one interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Address in CIDR notation, e.g. `10.0.0.5/24`
    pub address: String,
    pub gateway: String,
    #[serde(default)]
    pub nameservers: Vec<String>,
}

/// Interfaces keyed by normalized (lowercase) MAC address
pub type Interfaces = BTreeMap<String, Interface>;

/// Normalize a MAC address for use as an interface key
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

/// Split a CIDR address into address and prefix length
///
/// Returns `None` for the prefix when the address carries none.
pub fn split_cidr(cidr: &str) -> (&str, Option<u8>) {
    match cidr.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse().ok()),
        None => (cidr, None),
    }
}

/// Convert a prefix length to a dotted (IPv4) or colon (IPv6) netmask
pub fn prefix_to_netmask(addr: &IpAddr, prefix: u8) -> Option<String> {
    match addr {
        IpAddr::V4(_) if prefix <= 32 => {
            let bits = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            Some(Ipv4Addr::from(bits).to_string())
        }
        IpAddr::V6(_) if prefix <= 128 => {
            let bits = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            Some(Ipv6Addr::from(bits).to_string())
        }
        _ => None,
    }
}

//! Network config v1 rendering
//!
//! Generates the dictionary-based network configuration format consumed from
//! the NoCloud `network-config` file.

use super::Interfaces;
use crate::CloudInitError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level `network:` wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfigFile {
    pub network: NetworkConfigV1,
}

/// Network config v1 format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfigV1 {
    /// Version (always 1)
    pub version: u8,
    /// Network configuration items
    #[serde(default)]
    pub config: Vec<ConfigItem>,
}

/// Individual configuration item in v1 format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConfigItem {
    /// Physical network interface
    #[serde(rename = "physical")]
    Physical(PhysicalConfig),
}

/// Physical interface configuration (v1)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysicalConfig {
    /// Interface name
    pub name: String,
    /// MAC address for matching
    pub mac_address: String,
    /// Subnets (IP configuration)
    #[serde(default)]
    pub subnets: Vec<SubnetConfig>,
}

/// Subnet/IP configuration (v1)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubnetConfig {
    /// Subnet type: static or dhcp
    #[serde(rename = "type")]
    pub subnet_type: String,
    /// Address in CIDR notation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
    /// DNS servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_nameservers: Vec<String>,
}

impl NetworkConfigV1 {
    /// Build a v1 config with one static physical entry per interface
    pub fn from_interfaces(interfaces: &Interfaces) -> Self {
        debug!("Building network config v1 for {} interfaces", interfaces.len());

        let config = interfaces
            .iter()
            .enumerate()
            .map(|(index, (mac, iface))| {
                ConfigItem::Physical(PhysicalConfig {
                    name: format!("interface{}", index),
                    mac_address: mac.clone(),
                    subnets: vec![SubnetConfig {
                        subnet_type: "static".to_string(),
                        address: iface.address.clone(),
                        gateway: iface.gateway.clone(),
                        dns_nameservers: iface.nameservers.clone(),
                    }],
                })
            })
            .collect();

        Self { version: 1, config }
    }

    /// Parse v1 config from YAML, with or without the `network:` wrapper
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        match value.get("network") {
            Some(network) => serde_yaml::from_value(network.clone()),
            None => serde_yaml::from_value(value),
        }
    }
}

/// Render the NoCloud `network-config` document
pub fn render_network_config(interfaces: &Interfaces) -> Result<String, CloudInitError> {
    let file = NetworkConfigFile {
        network: NetworkConfigV1::from_interfaces(interfaces),
    };
    Ok(serde_yaml::to_string(&file)?)
}

//! GCE network-config renderer
//!
//! Same shape as network config v1, but JSON and with omit-empty subnets.

use super::{Renderer, RendererType};
use crate::CloudInitError;
use crate::network::Interfaces;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct GceNetwork<'a> {
    version: u8,
    config: Vec<GceInterface<'a>>,
}

#[derive(Debug, Serialize)]
struct GceInterface<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    mac_address: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subnets: Vec<GceSubnet<'a>>,
}

#[derive(Debug, Serialize)]
struct GceSubnet<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    address: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    gateway: &'a str,
    #[serde(rename = "dns_nameservers", skip_serializing_if = "<[String]>::is_empty")]
    dns: &'a [String],
}

/// GCE renderer
pub struct GceRenderer;

impl Renderer for GceRenderer {
    fn render(&self, interfaces: &Interfaces) -> Result<String, CloudInitError> {
        let network = GceNetwork {
            version: 1,
            config: interfaces
                .iter()
                .enumerate()
                .map(|(index, (mac, iface))| GceInterface {
                    kind: "physical",
                    name: format!("eth{}", index),
                    mac_address: mac,
                    subnets: vec![GceSubnet {
                        kind: "static",
                        address: &iface.address,
                        gateway: &iface.gateway,
                        dns: &iface.nameservers,
                    }],
                })
                .collect(),
        };
        Ok(serde_json::to_string(&network)?)
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Gce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Interface;

    #[test]
    fn test_render_gce() {
        let mut interfaces = Interfaces::new();
        interfaces.insert(
            "42:01:0a:8a:00:2b".to_string(),
            Interface {
                address: "10.0.0.10/24".to_string(),
                gateway: "10.0.0.1".to_string(),
                nameservers: vec!["8.8.8.8".to_string()],
            },
        );
        interfaces.insert(
            "42:01:0a:8a:00:2c".to_string(),
            Interface {
                address: "10.0.1.10/24".to_string(),
                gateway: String::new(),
                nameservers: Vec::new(),
            },
        );

        let json = GceRenderer.render(&interfaces).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], 1);
        let config = value["config"].as_array().unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config[0]["type"], "physical");
        assert_eq!(config[0]["name"], "eth0");
        assert_eq!(config[0]["mac_address"], "42:01:0a:8a:00:2b");
        assert_eq!(config[0]["subnets"][0]["dns_nameservers"][0], "8.8.8.8");
        assert_eq!(config[1]["name"], "eth1");
        assert!(config[1]["subnets"][0].get("gateway").is_none());
        assert!(config[1]["subnets"][0].get("dns_nameservers").is_none());
    }
}

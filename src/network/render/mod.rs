//! Network configuration renderers
//!
//! Translates the interface map into provider-specific network documents.
//!
//! Supported renderers:
//! - `v1` - cloud-init network config v1 (NoCloud `network-config`, YAML)
//! - `ec2` - flat interface list (`ec2/latest/network-data.json`)
//! - `gce` - versioned config list (GCE `network-config`, JSON)
//! - `openstack` - links/networks/services (`network_data.json`)

pub mod ec2;
pub mod gce;
pub mod openstack;

use crate::CloudInitError;
use crate::network::Interfaces;
use tracing::debug;

/// Network renderer types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererType {
    /// cloud-init network config v1
    V1,
    /// EC2 network-data.json
    Ec2,
    /// GCE network-config
    Gce,
    /// OpenStack network_data.json
    OpenStack,
}

/// Trait for network configuration renderers
pub trait Renderer {
    /// Render the interfaces into a document
    fn render(&self, interfaces: &Interfaces) -> Result<String, CloudInitError>;

    /// Get the renderer type
    fn renderer_type(&self) -> RendererType;
}

/// Generic v1 renderer
pub struct V1Renderer;

impl Renderer for V1Renderer {
    fn render(&self, interfaces: &Interfaces) -> Result<String, CloudInitError> {
        crate::network::v1::render_network_config(interfaces)
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::V1
    }
}

/// Render interfaces with the renderer of the given type
pub fn render(renderer_type: RendererType, interfaces: &Interfaces) -> Result<String, CloudInitError> {
    debug!("Rendering network config with {:?} renderer", renderer_type);

    match renderer_type {
        RendererType::V1 => V1Renderer.render(interfaces),
        RendererType::Ec2 => ec2::Ec2Renderer.render(interfaces),
        RendererType::Gce => gce::GceRenderer.render(interfaces),
        RendererType::OpenStack => openstack::OpenStackRenderer.render(interfaces),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Interface;

    fn interfaces() -> Interfaces {
        let mut interfaces = Interfaces::new();
        for (mac, addr) in [
            ("0e:49:61:0f:c3:11", "172.31.16.100/20"),
            ("02:00:00:00:00:01", "10.0.0.10/24"),
            ("c2:da:53:50:4d:61", "195.199.213.137/27"),
        ] {
            interfaces.insert(
                mac.to_string(),
                Interface {
                    address: addr.to_string(),
                    gateway: "10.0.0.1".to_string(),
                    nameservers: vec!["8.8.8.8".to_string()],
                },
            );
        }
        interfaces
    }

    fn v1_macs(doc: &str) -> Vec<String> {
        let value: serde_yaml::Value = serde_yaml::from_str(doc).unwrap();
        value["network"]["config"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|item| item["mac_address"].as_str().unwrap().to_string())
            .collect()
    }

    fn ec2_macs(doc: &str) -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(doc).unwrap();
        value["interfaces"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["mac"].as_str().unwrap().to_string())
            .collect()
    }

    fn gce_macs(doc: &str) -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(doc).unwrap();
        value["config"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["mac_address"].as_str().unwrap().to_string())
            .collect()
    }

    fn openstack_macs(doc: &str) -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(doc).unwrap();
        value["links"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["ethernet_mac_address"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_renderers_agree_on_order() {
        let interfaces = interfaces();
        let mut expected: Vec<String> = interfaces.keys().cloned().collect();
        expected.sort();

        let v1 = v1_macs(&render(RendererType::V1, &interfaces).unwrap());
        let ec2 = ec2_macs(&render(RendererType::Ec2, &interfaces).unwrap());
        let gce = gce_macs(&render(RendererType::Gce, &interfaces).unwrap());
        let openstack = openstack_macs(&render(RendererType::OpenStack, &interfaces).unwrap());

        assert_eq!(v1, expected);
        assert_eq!(ec2, expected);
        assert_eq!(gce, expected);
        assert_eq!(openstack, expected);
    }

    #[test]
    fn test_renderer_types() {
        assert_eq!(V1Renderer.renderer_type(), RendererType::V1);
        assert_eq!(ec2::Ec2Renderer.renderer_type(), RendererType::Ec2);
        assert_eq!(gce::GceRenderer.renderer_type(), RendererType::Gce);
        assert_eq!(
            openstack::OpenStackRenderer.renderer_type(),
            RendererType::OpenStack
        );
    }
}

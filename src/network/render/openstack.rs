//! OpenStack network_data.json renderer
//!
//! <https://docs.openstack.org/nova/latest/user/metadata.html#openstack-format-metadata>

use super::{Renderer, RendererType};
use crate::CloudInitError;
use crate::network::{Interfaces, prefix_to_netmask, split_cidr};
use serde::Serialize;
use std::net::IpAddr;
use tracing::warn;

#[derive(Debug, Serialize)]
struct NetworkData {
    links: Vec<Link>,
    networks: Vec<Network>,
    services: Vec<Service>,
}

#[derive(Debug, Serialize)]
struct Link {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    ethernet_mac_address: String,
}

#[derive(Debug, Serialize)]
struct Network {
    id: String,
    link: String,
    #[serde(rename = "type")]
    kind: &'static str,
    ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    netmask: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    routes: Vec<Route>,
}

#[derive(Debug, Serialize)]
struct Route {
    network: &'static str,
    netmask: &'static str,
    gateway: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Service {
    #[serde(rename = "type")]
    kind: &'static str,
    address: String,
}

/// OpenStack renderer
pub struct OpenStackRenderer;

impl Renderer for OpenStackRenderer {
    fn render(&self, interfaces: &Interfaces) -> Result<String, CloudInitError> {
        let mut data = NetworkData {
            links: Vec::new(),
            networks: Vec::new(),
            services: Vec::new(),
        };

        for (index, (mac, iface)) in interfaces.iter().enumerate() {
            let link_id = format!("interface{}", index);
            let (addr, prefix) = split_cidr(&iface.address);
            let ip: Option<IpAddr> = addr.parse().ok();

            if ip.is_none() {
                warn!("Cannot parse address {:?} for {}, netmask omitted", iface.address, mac);
            }

            let (kind, default_network) = match ip {
                Some(IpAddr::V6(_)) => ("ipv6", "::"),
                _ => ("ipv4", "0.0.0.0"),
            };
            let netmask = ip
                .as_ref()
                .zip(prefix)
                .and_then(|(ip, prefix)| prefix_to_netmask(ip, prefix));

            let mut routes = Vec::new();
            if !iface.gateway.is_empty() {
                routes.push(Route {
                    network: default_network,
                    netmask: default_network,
                    gateway: iface.gateway.clone(),
                });
            }

            data.networks.push(Network {
                id: format!("network{}", index),
                link: link_id.clone(),
                kind,
                ip_address: addr.to_string(),
                netmask,
                routes,
            });
            data.links.push(Link {
                id: link_id,
                kind: "phy",
                ethernet_mac_address: mac.clone(),
            });

            for ns in &iface.nameservers {
                let service = Service {
                    kind: "dns",
                    address: ns.clone(),
                };
                if !data.services.contains(&service) {
                    data.services.push(service);
                }
            }
        }

        Ok(serde_json::to_string(&data)?)
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::OpenStack
    }
}

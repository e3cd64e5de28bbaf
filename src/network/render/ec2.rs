//! EC2 network-data renderer

use super::{Renderer, RendererType};
use crate::CloudInitError;
use crate::network::Interfaces;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Ec2NetworkData<'a> {
    interfaces: Vec<Ec2Interface<'a>>,
}

#[derive(Debug, Serialize)]
struct Ec2Interface<'a> {
    mac: &'a str,
    ip: &'a str,
    gateway: &'a str,
    dns: &'a [String],
}

/// EC2 renderer (flat JSON interface list)
pub struct Ec2Renderer;

impl Renderer for Ec2Renderer {
    fn render(&self, interfaces: &Interfaces) -> Result<String, CloudInitError> {
        let data = Ec2NetworkData {
            interfaces: interfaces
                .iter()
                .map(|(mac, iface)| Ec2Interface {
                    mac,
                    ip: &iface.address,
                    gateway: &iface.gateway,
                    dns: &iface.nameservers,
                })
                .collect(),
        };
        Ok(serde_json::to_string(&data)?)
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Ec2
    }
}

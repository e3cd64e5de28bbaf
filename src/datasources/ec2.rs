//! EC2 (AWS) datasource
//!
//! Lays out an EC2-style seed under `ec2/latest/` with volume label
//! `ec2-seed`. Metadata is JSON, shaped after the instance metadata
//! categories:
//! <https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instancedata-data-categories.html>

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{Datasource, ProviderMetadata, SeedPaths};
use crate::network::render::RendererType;
use crate::{CloudInitError, SeedConfig};

/// EC2 instance metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2Metadata {
    #[serde(rename = "instance-id")]
    pub instance_id: String,

    #[serde(rename = "local-hostname")]
    pub local_hostname: String,

    #[serde(rename = "public-hostname", skip_serializing_if = "String::is_empty")]
    pub public_hostname: String,

    #[serde(rename = "public-ipv4", skip_serializing_if = "String::is_empty")]
    pub public_ipv4: String,

    #[serde(rename = "local-ipv4", skip_serializing_if = "String::is_empty")]
    pub local_ipv4: String,

    #[serde(rename = "availability-zone", skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,

    #[serde(rename = "instance-type", skip_serializing_if = "String::is_empty")]
    pub instance_type: String,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl SeedConfig {
    fn ec2_metadata_mut(&mut self) -> Result<&mut Ec2Metadata, CloudInitError> {
        let actual = self.kind().name();
        match self.metadata_mut() {
            ProviderMetadata::Ec2(meta) => Ok(meta),
            _ => Err(CloudInitError::mismatch("EC2", actual)),
        }
    }

    /// Set the EC2 instance id, availability zone and tags
    ///
    /// Tags replace any previously set tags.
    pub fn set_ec2_metadata(
        &mut self,
        instance_id: impl Into<String>,
        availability_zone: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Result<(), CloudInitError> {
        let meta = self.ec2_metadata_mut()?;
        meta.instance_id = instance_id.into();
        meta.availability_zone = availability_zone.into();
        meta.tags = tags;
        Ok(())
    }

    pub fn add_ec2_tag(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.ec2_metadata_mut()?.tags.insert(key.into(), value.into());
        Ok(())
    }

    pub fn set_ec2_instance_type(
        &mut self,
        instance_type: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.ec2_metadata_mut()?.instance_type = instance_type.into();
        Ok(())
    }

    /// Set the private and (optionally) public IPv4 addresses
    pub fn set_ec2_ipv4(
        &mut self,
        local_ipv4: impl Into<String>,
        public_ipv4: Option<String>,
    ) -> Result<(), CloudInitError> {
        let meta = self.ec2_metadata_mut()?;
        meta.local_ipv4 = local_ipv4.into();
        meta.public_ipv4 = public_ipv4.unwrap_or_default();
        Ok(())
    }

    pub fn set_ec2_public_hostname(
        &mut self,
        hostname: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.ec2_metadata_mut()?.public_hostname = hostname.into();
        Ok(())
    }
}

/// EC2 datasource
pub struct Ec2;

impl Datasource for Ec2 {
    fn name(&self) -> &'static str {
        "EC2"
    }

    fn volume_label(&self) -> &'static str {
        "ec2-seed"
    }

    fn paths(&self) -> SeedPaths {
        SeedPaths {
            meta_data: "ec2/latest/meta-data.json",
            user_data: "ec2/latest/user-data",
            network_config: "ec2/latest/network-data.json",
        }
    }

    fn network_renderer(&self) -> RendererType {
        RendererType::Ec2
    }

    fn render_metadata(&self, config: &SeedConfig) -> Result<String, CloudInitError> {
        let mut meta = match config.metadata() {
            ProviderMetadata::Ec2(meta) => meta.clone(),
            _ => Ec2Metadata::default(),
        };

        if meta.instance_id.is_empty() {
            debug!("No EC2 instance id set, deriving from FQDN");
            meta.instance_id = config.instance_id().to_string();
        }
        if meta.local_hostname.is_empty() {
            meta.local_hostname = config.fqdn().to_string();
        }

        Ok(serde_json::to_string(&meta)?)
    }
}

//! OpenStack config-drive datasource
//!
//! Lays out a config drive under `openstack/latest/` with volume label
//! `config-2`.
//! <https://docs.openstack.org/nova/latest/user/metadata.html>

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Datasource, ProviderMetadata, SeedPaths};
use crate::network::render::RendererType;
use crate::{CloudInitError, SeedConfig};

/// OpenStack `meta_data.json` structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDriveMetadata {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub launch_index: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    /// User supplied key/value metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl ConfigDriveMetadata {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: String::new(),
            hostname: String::new(),
            launch_index: 0,
            availability_zone: String::new(),
            project_id: String::new(),
            meta: BTreeMap::new(),
        }
    }
}

impl SeedConfig {
    fn config_drive_metadata_mut(&mut self) -> Result<&mut ConfigDriveMetadata, CloudInitError> {
        let actual = self.kind().name();
        match self.metadata_mut() {
            ProviderMetadata::ConfigDrive(meta) => Ok(meta),
            _ => Err(CloudInitError::mismatch("ConfigDrive", actual)),
        }
    }

    /// Set the server name, availability zone and project
    pub fn set_config_drive_metadata(
        &mut self,
        name: impl Into<String>,
        availability_zone: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        let meta = self.config_drive_metadata_mut()?;
        meta.name = name.into();
        meta.availability_zone = availability_zone.into();
        meta.project_id = project_id.into();
        Ok(())
    }

    pub fn add_config_drive_meta(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.config_drive_metadata_mut()?
            .meta
            .insert(key.into(), value.into());
        Ok(())
    }
}

/// OpenStack config-drive datasource
pub struct ConfigDrive;

impl Datasource for ConfigDrive {
    fn name(&self) -> &'static str {
        "ConfigDrive"
    }

    fn volume_label(&self) -> &'static str {
        "config-2"
    }

    fn paths(&self) -> SeedPaths {
        SeedPaths {
            meta_data: "openstack/latest/meta_data.json",
            user_data: "openstack/latest/user_data",
            network_config: "openstack/latest/network_data.json",
        }
    }

    fn network_renderer(&self) -> RendererType {
        RendererType::OpenStack
    }

    fn render_metadata(&self, config: &SeedConfig) -> Result<String, CloudInitError> {
        let mut meta = match config.metadata() {
            ProviderMetadata::ConfigDrive(meta) => meta.clone(),
            _ => ConfigDriveMetadata::new(config.instance_id()),
        };

        if meta.name.is_empty() {
            meta.name = config.instance_id().to_string();
        }
        if meta.hostname.is_empty() {
            meta.hostname = config.fqdn().to_string();
        }

        Ok(serde_json::to_string(&meta)?)
    }
}

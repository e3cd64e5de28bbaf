//! GCE (Google Compute Engine) datasource
//!
//! Writes instance metadata to `computeMetadata/v1/instance/attributes.json`
//! with volume label `google-compute-engine`.
//! <https://cloud.google.com/compute/docs/metadata/overview>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Datasource, ProviderMetadata, SeedPaths};
use crate::network::render::RendererType;
use crate::{CloudInitError, SeedConfig};

/// Access config type for an external NAT address
pub const ONE_TO_ONE_NAT: &str = "ONE_TO_ONE_NAT";

/// GCE instance metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GceMetadata {
    pub instance: GceInstance,
    pub project: GceProject,
}

/// Instance-specific metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub zone: String,
    pub machine_type: String,
    /// Network tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<GceServiceAccount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<GceNetworkInterface>,
    /// Stamped when the metadata is set, never at render time
    pub created_at: DateTime<Utc>,
}

/// Project-specific metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceProject {
    pub project_id: String,
    pub project_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GceServiceAccount {
    pub email: String,
    /// OAuth scopes granted to the account
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GceNetworkInterface {
    /// VPC network name
    pub network: String,
    pub subnetwork: String,
    /// Internal IP address
    #[serde(rename = "networkIP")]
    pub network_ip: String,
    #[serde(
        rename = "accessConfigs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub access_configs: Vec<GceAccessConfig>,
}

/// External access configuration for a network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GceAccessConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl GceMetadata {
    /// Empty metadata stamped with the current time
    pub fn new() -> Self {
        Self {
            instance: GceInstance {
                id: String::new(),
                name: String::new(),
                hostname: String::new(),
                zone: String::new(),
                machine_type: String::new(),
                tags: Vec::new(),
                labels: BTreeMap::new(),
                service_accounts: Vec::new(),
                network_interfaces: Vec::new(),
                created_at: Utc::now(),
            },
            project: GceProject::default(),
        }
    }
}

impl Default for GceMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedConfig {
    fn gce_metadata_mut(&mut self) -> Result<&mut GceMetadata, CloudInitError> {
        let actual = self.kind().name();
        match self.metadata_mut() {
            ProviderMetadata::Gce(meta) => Ok(meta),
            _ => Err(CloudInitError::mismatch("GCE", actual)),
        }
    }

    /// Set instance name, zone and project, stamping the creation time
    pub fn set_gce_metadata(
        &mut self,
        instance_name: impl Into<String>,
        zone: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        let meta = self.gce_metadata_mut()?;
        meta.instance.name = instance_name.into();
        meta.instance.zone = zone.into();
        meta.project.project_id = project_id.into();
        meta.instance.created_at = Utc::now();
        Ok(())
    }

    pub fn set_gce_instance_id(&mut self, id: impl Into<String>) -> Result<(), CloudInitError> {
        self.gce_metadata_mut()?.instance.id = id.into();
        Ok(())
    }

    pub fn add_gce_label(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.gce_metadata_mut()?
            .instance
            .labels
            .insert(key.into(), value.into());
        Ok(())
    }

    pub fn add_gce_network_tag(&mut self, tag: impl Into<String>) -> Result<(), CloudInitError> {
        let tag = tag.into();
        let tags = &mut self.gce_metadata_mut()?.instance.tags;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        Ok(())
    }

    pub fn set_gce_machine_type(
        &mut self,
        machine_type: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.gce_metadata_mut()?.instance.machine_type = machine_type.into();
        Ok(())
    }

    pub fn set_gce_project_number(
        &mut self,
        project_number: impl Into<String>,
    ) -> Result<(), CloudInitError> {
        self.gce_metadata_mut()?.project.project_number = project_number.into();
        Ok(())
    }

    pub fn add_gce_service_account(
        &mut self,
        email: impl Into<String>,
        scopes: Vec<String>,
    ) -> Result<(), CloudInitError> {
        self.gce_metadata_mut()?
            .instance
            .service_accounts
            .push(GceServiceAccount {
                email: email.into(),
                scopes,
            });
        Ok(())
    }

    /// Add a VPC interface summary, optionally with an external NAT address
    pub fn add_gce_network_interface(
        &mut self,
        network: impl Into<String>,
        subnetwork: impl Into<String>,
        network_ip: impl Into<String>,
        external_nat: bool,
    ) -> Result<(), CloudInitError> {
        let access_configs = if external_nat {
            vec![GceAccessConfig {
                kind: ONE_TO_ONE_NAT.to_string(),
                name: "External NAT".to_string(),
            }]
        } else {
            Vec::new()
        };

        self.gce_metadata_mut()?
            .instance
            .network_interfaces
            .push(GceNetworkInterface {
                network: network.into(),
                subnetwork: subnetwork.into(),
                network_ip: network_ip.into(),
                access_configs,
            });
        Ok(())
    }
}

/// GCE datasource
pub struct Gce;

impl Datasource for Gce {
    fn name(&self) -> &'static str {
        "GCE"
    }

    fn volume_label(&self) -> &'static str {
        "google-compute-engine"
    }

    fn paths(&self) -> SeedPaths {
        SeedPaths {
            meta_data: "computeMetadata/v1/instance/attributes.json",
            user_data: "user-data",
            network_config: "network-config",
        }
    }

    fn network_renderer(&self) -> RendererType {
        RendererType::Gce
    }

    fn render_metadata(&self, config: &SeedConfig) -> Result<String, CloudInitError> {
        let mut meta = match config.metadata() {
            ProviderMetadata::Gce(meta) => meta.clone(),
            _ => GceMetadata::new(),
        };

        let instance = &mut meta.instance;
        if instance.id.is_empty() {
            instance.id = config.instance_id().to_string();
        }
        if instance.name.is_empty() {
            instance.name = config.instance_id().to_string();
        }
        if instance.hostname.is_empty() {
            instance.hostname = config.fqdn().to_string();
        }

        Ok(serde_json::to_string(&meta)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metadata() {
        let mut config = SeedConfig::new_gce().unwrap();
        config
            .set_gce_metadata("test-instance", "us-central1-a", "test-project")
            .unwrap();

        let json = Gce.render_metadata(&config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["instance"]["name"], "test-instance");
        assert_eq!(value["instance"]["zone"], "us-central1-a");
        assert_eq!(value["instance"]["hostname"], config.fqdn());
        assert_eq!(value["project"]["projectId"], "test-project");
        assert!(value["instance"]["createdAt"].is_string());
        assert!(value["instance"].get("labels").is_none());
    }

    #[test]
    fn test_created_at_stamped_on_set_not_render() {
        let mut config = SeedConfig::new_gce().unwrap();
        config
            .set_gce_metadata("test-instance", "us-central1-a", "test-project")
            .unwrap();

        let first = Gce.render_metadata(&config).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = Gce.render_metadata(&config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_labels_and_interfaces() {
        let mut config = SeedConfig::new_gce().unwrap();
        config.add_gce_label("env", "test").unwrap();
        config.add_gce_label("team", "dev").unwrap();
        config.add_gce_network_tag("http-server").unwrap();
        config.add_gce_network_tag("http-server").unwrap();
        config
            .add_gce_network_interface("default", "default", "10.128.0.2", true)
            .unwrap();
        config
            .add_gce_service_account(
                "sa@test-project.iam.gserviceaccount.com",
                vec!["https://www.googleapis.com/auth/cloud-platform".to_string()],
            )
            .unwrap();

        let json = Gce.render_metadata(&config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let instance = &value["instance"];

        assert_eq!(instance["labels"]["env"], "test");
        assert_eq!(instance["labels"]["team"], "dev");
        assert_eq!(instance["tags"].as_array().unwrap().len(), 1);
        assert_eq!(instance["networkInterfaces"][0]["networkIP"], "10.128.0.2");
        assert_eq!(
            instance["networkInterfaces"][0]["accessConfigs"][0]["type"],
            ONE_TO_ONE_NAT
        );
        assert_eq!(
            instance["serviceAccounts"][0]["email"],
            "sa@test-project.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_setters_rejected_on_other_kinds() {
        let mut config = SeedConfig::new_ec2().unwrap();
        let err = config.add_gce_label("env", "test").unwrap_err();
        assert!(matches!(
            err,
            CloudInitError::MetadataMismatch {
                expected: "GCE",
                actual: "EC2"
            }
        ));
    }
}

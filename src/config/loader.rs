//! Seed profile loader
//!
//! A seed profile is a YAML (or JSON) file describing a [`SeedConfig`].
//! Several profiles can be layered, see [`merge`](super::merge).

use super::merge;
use crate::datasources::DataSourceKind;
use crate::seed::User;
use crate::{CloudInitError, SeedConfig};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// A seed profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    /// Target datasource, NoCloud when absent
    pub datasource: Option<DataSourceKind>,
    /// FQDN, random when absent
    pub fqdn: Option<String>,
    pub root_password: String,
    /// bcrypt cost for user passwords
    pub password_cost: Option<u32>,
    pub users: Vec<User>,
    pub interfaces: Vec<InterfaceProfile>,
    pub guest_agent: bool,
    pub packages: Vec<String>,
    pub runcmd: Vec<String>,
    pub package_update: bool,
    pub package_upgrade: bool,
    pub password_changes: Vec<PasswordChangeProfile>,
    pub expire_passwords: bool,
    pub timezone: String,
    pub locale: String,
    pub ssh_pwauth: bool,
    pub disable_root: bool,
    /// Devices or mount points to grow
    pub storage: Vec<String>,
    pub mounts: Vec<Vec<String>>,
    pub write_files: Vec<WriteFileProfile>,
    pub ec2: Option<Ec2Profile>,
    pub gce: Option<GceProfile>,
    pub configdrive: Option<ConfigDriveProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterfaceProfile {
    pub mac: String,
    /// Address in CIDR notation
    pub address: String,
    pub gateway: String,
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordChangeProfile {
    pub user: String,
    pub password: String,
}

/// File entry; `encoding` describes how the profile carries the content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteFileProfile {
    pub path: String,
    pub content: String,
    pub permissions: String,
    pub owner: String,
    /// `b64` when `content` is base64, `gzip` to compress on output
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Ec2Profile {
    pub instance_id: String,
    pub availability_zone: String,
    pub instance_type: String,
    pub local_ipv4: String,
    pub public_ipv4: Option<String>,
    pub public_hostname: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GceProfile {
    pub instance_id: String,
    pub instance_name: String,
    pub zone: String,
    pub project_id: String,
    pub project_number: String,
    pub machine_type: String,
    pub labels: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub service_accounts: Vec<GceServiceAccountProfile>,
    pub network_interfaces: Vec<GceNetworkInterfaceProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GceServiceAccountProfile {
    pub email: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GceNetworkInterfaceProfile {
    pub network: String,
    pub subnetwork: String,
    pub ip: String,
    /// Attach an external NAT address
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigDriveProfile {
    pub name: String,
    pub availability_zone: String,
    pub project_id: String,
    pub meta: BTreeMap<String, String>,
}

/// Load and merge profiles in order (later files have higher priority)
pub fn load_profiles<P: AsRef<Path>>(paths: &[P]) -> Result<Profile, CloudInitError> {
    if paths.is_empty() {
        return Err(CloudInitError::Config(
            "At least one profile is required".to_string(),
        ));
    }

    let mut layers = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CloudInitError::Config(format!("Failed to read profile {}: {}", path.display(), e))
        })?;
        let layer: Value = serde_yaml::from_str(&content).map_err(|e| {
            CloudInitError::Config(format!("Failed to parse profile {}: {}", path.display(), e))
        })?;
        debug!("Loaded profile layer from {}", path.display());
        layers.push(layer);
    }

    let profile = Profile::from_value(merge::merge_layers(layers))?;
    info!("Loaded {} profile(s)", paths.len());
    Ok(profile)
}

impl Profile {
    /// Parse a single profile document
    pub fn from_yaml(yaml: &str) -> Result<Self, CloudInitError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(merge::merge_layers(vec![value]))
    }

    fn from_value(value: Value) -> Result<Self, CloudInitError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value)
            .map_err(|e| CloudInitError::Config(format!("Invalid profile: {}", e)))
    }

    /// Datasource the profile targets
    pub fn kind(&self) -> DataSourceKind {
        self.datasource.unwrap_or(DataSourceKind::NoCloud)
    }

    /// Build the seed model by applying every profile setting
    pub fn into_seed_config(self) -> Result<SeedConfig, CloudInitError> {
        let mut config = SeedConfig::new(self.kind())?;

        if let Some(fqdn) = self.fqdn {
            config.set_fqdn(fqdn);
        }
        if let Some(cost) = self.password_cost {
            config.set_password_cost(cost);
        }
        if !self.root_password.is_empty() {
            config.set_root_password(self.root_password);
        }

        for user in self.users {
            config.add_user(user)?;
        }

        for iface in &self.interfaces {
            let nameservers: Vec<&str> = iface.nameservers.iter().map(String::as_str).collect();
            config.set_static_interface(&iface.mac, &iface.address, &iface.gateway, &nameservers);
        }

        if self.guest_agent {
            config.enable_guest_agent();
        }
        for package in self.packages {
            config.add_package(package);
        }
        for command in self.runcmd {
            config.add_run_command(command);
        }
        config.set_package_update(self.package_update);
        config.set_package_upgrade(self.package_upgrade);

        for change in &self.password_changes {
            config.add_password_change(&change.user, &change.password);
        }
        config.set_password_expiry(self.expire_passwords);

        if !self.timezone.is_empty() {
            config.set_timezone(self.timezone);
        }
        if !self.locale.is_empty() {
            config.set_locale(self.locale);
        }
        if self.ssh_pwauth {
            config.enable_ssh_password_auth();
        }
        if self.disable_root {
            config.disable_root_login();
        }

        if !self.storage.is_empty() {
            config.configure_storage(&self.storage);
        }
        for mount in &self.mounts {
            config.add_mount(mount);
        }

        for file in self.write_files {
            apply_write_file(&mut config, file)?;
        }

        if let Some(ec2) = self.ec2 {
            apply_ec2(&mut config, ec2)?;
        }
        if let Some(gce) = self.gce {
            apply_gce(&mut config, gce)?;
        }
        if let Some(configdrive) = self.configdrive {
            config.set_config_drive_metadata(
                configdrive.name,
                configdrive.availability_zone,
                configdrive.project_id,
            )?;
            for (key, value) in configdrive.meta {
                config.add_config_drive_meta(key, value)?;
            }
        }

        Ok(config)
    }
}

fn apply_write_file(config: &mut SeedConfig, file: WriteFileProfile) -> Result<(), CloudInitError> {
    if file.path.is_empty() {
        return Err(CloudInitError::Config(
            "write_files entry without a path".to_string(),
        ));
    }

    let (content, compress) = match file.encoding.as_deref() {
        None | Some("text/plain") => (file.content.into_bytes(), false),
        Some("b64") | Some("base64") => (decode_base64(&file.path, &file.content)?, false),
        Some("gzip") | Some("gz") => (file.content.into_bytes(), true),
        Some(other) => {
            return Err(CloudInitError::Config(format!(
                "Unknown encoding {:?} for {}",
                other, file.path
            )));
        }
    };

    if compress {
        config.add_compressed_file(file.path.clone(), content, file.permissions);
    } else {
        config.add_file(file.path.clone(), content, file.permissions);
    }
    if !file.owner.is_empty() {
        config.set_file_owner(&file.path, file.owner);
    }
    Ok(())
}

fn decode_base64(path: &str, content: &str) -> Result<Vec<u8>, CloudInitError> {
    BASE64
        .decode(content.trim())
        .map_err(|e| CloudInitError::Config(format!("Invalid base64 content for {}: {}", path, e)))
}

fn apply_ec2(config: &mut SeedConfig, ec2: Ec2Profile) -> Result<(), CloudInitError> {
    config.set_ec2_metadata(ec2.instance_id, ec2.availability_zone, ec2.tags)?;
    if !ec2.instance_type.is_empty() {
        config.set_ec2_instance_type(ec2.instance_type)?;
    }
    if !ec2.local_ipv4.is_empty() || ec2.public_ipv4.is_some() {
        config.set_ec2_ipv4(ec2.local_ipv4, ec2.public_ipv4)?;
    }
    if !ec2.public_hostname.is_empty() {
        config.set_ec2_public_hostname(ec2.public_hostname)?;
    }
    Ok(())
}

fn apply_gce(config: &mut SeedConfig, gce: GceProfile) -> Result<(), CloudInitError> {
    config.set_gce_metadata(gce.instance_name, gce.zone, gce.project_id)?;
    if !gce.instance_id.is_empty() {
        config.set_gce_instance_id(gce.instance_id)?;
    }
    if !gce.project_number.is_empty() {
        config.set_gce_project_number(gce.project_number)?;
    }
    if !gce.machine_type.is_empty() {
        config.set_gce_machine_type(gce.machine_type)?;
    }
    for (key, value) in gce.labels {
        config.add_gce_label(key, value)?;
    }
    for tag in gce.tags {
        config.add_gce_network_tag(tag)?;
    }
    for account in gce.service_accounts {
        config.add_gce_service_account(account.email, account.scopes)?;
    }
    for iface in gce.network_interfaces {
        config.add_gce_network_interface(iface.network, iface.subnetwork, iface.ip, iface.external)?;
    }
    Ok(())
}

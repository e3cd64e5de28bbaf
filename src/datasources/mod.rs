//! Datasource implementations for various cloud providers
//!
//! A datasource decides which documents go into a seed image, where they
//! live inside the image and which volume label the image carries. The
//! datasource kind is chosen once, when the [`SeedConfig`] is constructed.

pub mod ec2;
pub mod gce;
pub mod nocloud;
pub mod openstack;

use crate::config::CloudConfig;
use crate::network::render::{self, RendererType};
use crate::{CloudInitError, SeedConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Supported datasource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSourceKind {
    /// Local ISO provisioning (`cidata`)
    #[serde(rename = "nocloud")]
    NoCloud,
    /// Amazon EC2 style metadata
    #[serde(rename = "ec2")]
    Ec2,
    /// Google Compute Engine style metadata
    #[serde(rename = "gce")]
    Gce,
    /// OpenStack config drive (`config-2`)
    #[serde(rename = "configdrive")]
    ConfigDrive,
}

impl DataSourceKind {
    /// All kinds, in declaration order
    pub const ALL: [DataSourceKind; 4] = [Self::NoCloud, Self::Ec2, Self::Gce, Self::ConfigDrive];

    /// Human readable name
    pub fn name(self) -> &'static str {
        self.datasource().name()
    }

    /// The datasource implementation for this kind
    pub fn datasource(self) -> &'static dyn Datasource {
        match self {
            Self::NoCloud => &nocloud::NoCloud,
            Self::Ec2 => &ec2::Ec2,
            Self::Gce => &gce::Gce,
            Self::ConfigDrive => &openstack::ConfigDrive,
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataSourceKind {
    type Err = CloudInitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nocloud" => Ok(Self::NoCloud),
            "ec2" | "aws" => Ok(Self::Ec2),
            "gce" | "gcp" => Ok(Self::Gce),
            "configdrive" | "config-drive" | "openstack" => Ok(Self::ConfigDrive),
            other => Err(CloudInitError::Config(format!(
                "Unknown datasource: {}",
                other
            ))),
        }
    }
}

/// Provider metadata carried by a [`SeedConfig`]
///
/// The variant always matches the datasource kind of the model.
#[derive(Debug, Clone)]
pub enum ProviderMetadata {
    /// NoCloud metadata is derived entirely from the FQDN
    NoCloud,
    Ec2(ec2::Ec2Metadata),
    Gce(gce::GceMetadata),
    ConfigDrive(openstack::ConfigDriveMetadata),
}

/// Internal paths of the seed documents for a datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPaths {
    pub meta_data: &'static str,
    pub user_data: &'static str,
    pub network_config: &'static str,
}

/// A rendered document and its path inside the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFile {
    /// Path relative to the image root
    pub path: String,
    pub content: String,
}

/// Trait for seed datasources
pub trait Datasource: Send + Sync {
    /// Name of this datasource (e.g., "EC2", "NoCloud", "GCE")
    fn name(&self) -> &'static str;

    /// Volume label the guest agent looks for
    fn volume_label(&self) -> &'static str;

    /// Paths of the documents inside the image
    fn paths(&self) -> SeedPaths;

    /// Renderer used for the network document
    fn network_renderer(&self) -> RendererType;

    /// Render the instance metadata document
    fn render_metadata(&self, config: &SeedConfig) -> Result<String, CloudInitError>;

    /// Render every document for this datasource
    ///
    /// The network document is only produced when interfaces are configured.
    fn render_files(&self, config: &SeedConfig) -> Result<Vec<SeedFile>, CloudInitError> {
        let paths = self.paths();
        debug!("Rendering {} seed documents", self.name());

        let mut files = vec![
            SeedFile {
                path: paths.meta_data.to_string(),
                content: self.render_metadata(config)?,
            },
            SeedFile {
                path: paths.user_data.to_string(),
                content: CloudConfig::from_seed(config)?.to_document()?,
            },
        ];

        if !config.interfaces().is_empty() {
            files.push(SeedFile {
                path: paths.network_config.to_string(),
                content: render::render(self.network_renderer(), config.interfaces())?,
            });
        }

        Ok(files)
    }
}

//! NoCloud datasource
//!
//! Seeds a guest from a local ISO with volume label `cidata`. The image root
//! carries `meta-data`, `user-data` and, optionally, `network-config`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Datasource, SeedPaths};
use crate::network::render::RendererType;
use crate::{CloudInitError, SeedConfig};

/// NoCloud `meta-data` document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoCloudMetadata {
    #[serde(rename = "instance-id")]
    pub instance_id: String,
    #[serde(rename = "local-hostname")]
    pub local_hostname: String,
}

impl NoCloudMetadata {
    /// Derive metadata from the configured FQDN
    pub fn from_seed(config: &SeedConfig) -> Self {
        if !config.fqdn().contains('.') {
            warn!(
                "FQDN {:?} has no domain part, using it as instance id",
                config.fqdn()
            );
        }

        Self {
            instance_id: config.instance_id().to_string(),
            local_hostname: config.fqdn().to_string(),
        }
    }
}

/// NoCloud datasource for local ISO seeds
pub struct NoCloud;

impl Datasource for NoCloud {
    fn name(&self) -> &'static str {
        "NoCloud"
    }

    fn volume_label(&self) -> &'static str {
        "cidata"
    }

    fn paths(&self) -> SeedPaths {
        SeedPaths {
            meta_data: "meta-data",
            user_data: "user-data",
            network_config: "network-config",
        }
    }

    fn network_renderer(&self) -> RendererType {
        RendererType::V1
    }

    fn render_metadata(&self, config: &SeedConfig) -> Result<String, CloudInitError> {
        Ok(serde_yaml::to_string(&NoCloudMetadata::from_seed(config))?)
    }
}

//! Cloud-config document types and rendering
//!
//! Renders the `user-data` document of a seed from a [`SeedConfig`]. The
//! same types parse an existing cloud-config back, which the tests use for
//! structural assertions.

pub mod loader;
pub mod merge;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

use crate::seed::{User, WriteFile};
use crate::{CloudInitError, SeedConfig};

/// First line of every cloud-config document
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Package installed when the guest agent is enabled
pub const GUEST_AGENT_PACKAGE: &str = "qemu-guest-agent";

/// Command appended when the guest agent is enabled
pub const GUEST_AGENT_COMMAND: &str = "systemctl enable qemu-guest-agent --now";

/// Main cloud-config structure
///
/// Field order is the key order of the rendered document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Users to create
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserConfig>,

    /// Password changes applied on first boot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chpasswd: Option<ChpasswdConfig>,

    #[serde(skip_serializing_if = "is_false")]
    pub package_update: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub package_upgrade: bool,

    /// Commands to run, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runcmd: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub write_files: Vec<WriteFileConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub timezone: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub locale: String,

    /// Root-level SSH password authentication
    #[serde(skip_serializing_if = "is_false")]
    pub ssh_pwauth: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub disable_root: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub growpart: Option<GrowpartConfig>,

    /// fstab-style mount entries
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Vec<String>>,
}

/// User entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub groups: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shell: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sudo: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_authorized_keys: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub passwd: String,
    /// Always emitted, the agent defaults it to true when absent
    pub lock_passwd: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub ssh_pwauth: bool,
}

/// `chpasswd` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChpasswdConfig {
    pub expire: bool,
    /// `user:password` entries
    pub list: Vec<String>,
}

/// File to write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteFileConfig {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

/// Growpart configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowpartConfig {
    pub mode: String,
    pub devices: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl From<&User> for UserConfig {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            groups: user.groups.clone(),
            shell: user.shell.clone(),
            sudo: user.sudo.clone(),
            ssh_authorized_keys: user.ssh_authorized_keys.clone(),
            passwd: user.password.clone(),
            lock_passwd: user.lock_password,
            ssh_pwauth: user.ssh_password_auth,
        }
    }
}

impl WriteFileConfig {
    /// Encode a file entry: plain text when possible, otherwise base64
    fn from_file(file: &WriteFile) -> Result<Self, CloudInitError> {
        let (content, encoding) = if file.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&file.content)?;
            let compressed = encoder.finish()?;
            (BASE64.encode(compressed), Some("gz+b64".to_string()))
        } else {
            match std::str::from_utf8(&file.content) {
                Ok(text) => (text.to_string(), None),
                Err(_) => (BASE64.encode(&file.content), Some("b64".to_string())),
            }
        };

        Ok(Self {
            path: file.path.clone(),
            content,
            encoding,
            owner: non_empty(&file.owner),
            permissions: non_empty(&file.permissions),
        })
    }

    /// Decoded file content
    pub fn decoded(&self) -> Result<Vec<u8>, CloudInitError> {
        let decode = |s: &str| {
            BASE64
                .decode(s.trim())
                .map_err(|e| CloudInitError::Config(format!("Invalid base64 in {}: {}", self.path, e)))
        };

        match self.encoding.as_deref() {
            None | Some("text/plain") => Ok(self.content.clone().into_bytes()),
            Some("b64") | Some("base64") => decode(&self.content),
            Some("gz+b64") | Some("gzip+base64") => {
                let compressed = decode(&self.content)?;
                let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
                let mut out = Vec::new();
                std::io::Read::read_to_end(&mut decoder, &mut out)?;
                Ok(out)
            }
            Some(other) => Err(CloudInitError::Config(format!(
                "Unknown write_files encoding: {}",
                other
            ))),
        }
    }
}

impl CloudConfig {
    /// Project the seed model onto a cloud-config document
    pub fn from_seed(config: &SeedConfig) -> Result<Self, CloudInitError> {
        let mut packages = config.packages().to_vec();
        let mut runcmd = config.run_commands().to_vec();
        let mut package_update = config.package_update();

        if config.guest_agent_enabled() {
            debug!("Appending guest agent package and service command");
            if !packages.iter().any(|p| p == GUEST_AGENT_PACKAGE) {
                packages.push(GUEST_AGENT_PACKAGE.to_string());
            }
            if !runcmd.iter().any(|c| c == GUEST_AGENT_COMMAND) {
                runcmd.push(GUEST_AGENT_COMMAND.to_string());
            }
            package_update = true;
        }

        let mut chpasswd_list = Vec::new();
        if !config.root_password().is_empty() {
            chpasswd_list.push(format!("root:{}", config.root_password()));
        }
        chpasswd_list.extend(config.password_changes().iter().cloned());
        let chpasswd = (!chpasswd_list.is_empty()).then(|| ChpasswdConfig {
            expire: config.expire_passwords(),
            list: chpasswd_list,
        });

        let growpart = (!config.storage_devices().is_empty()).then(|| GrowpartConfig {
            mode: "auto".to_string(),
            devices: config.storage_devices().to_vec(),
        });

        let write_files = config
            .write_files()
            .iter()
            .map(WriteFileConfig::from_file)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            users: config.users().iter().map(UserConfig::from).collect(),
            chpasswd,
            package_update,
            package_upgrade: config.package_upgrade(),
            runcmd,
            write_files,
            packages,
            timezone: config.timezone().to_string(),
            locale: config.locale().to_string(),
            ssh_pwauth: config.ssh_password_auth(),
            disable_root: config.disable_root(),
            growpart,
            mounts: config.mounts().to_vec(),
        })
    }

    /// Render the document: the header line followed by the YAML body
    pub fn to_document(&self) -> Result<String, CloudInitError> {
        let body = serde_yaml::to_string(self)?;
        Ok(format!("{}\n{}", CLOUD_CONFIG_HEADER, body))
    }

    /// Parse cloud-config from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // Strip #cloud-config header if present
        let yaml = yaml
            .trim_start()
            .strip_prefix(CLOUD_CONFIG_HEADER)
            .map(|s| s.trim_start())
            .unwrap_or(yaml);

        serde_yaml::from_str(yaml)
    }

    /// Check if this looks like a cloud-config (starts with #cloud-config)
    pub fn is_cloud_config(data: &str) -> bool {
        data.trim_start().starts_with(CLOUD_CONFIG_HEADER)
    }
}

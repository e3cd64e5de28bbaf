//! Unified seed configuration model
//!
//! A [`SeedConfig`] holds everything any datasource might need: users,
//! passwords, interfaces, packages, commands, storage and the provider
//! metadata of its datasource. It is created by one of the per-datasource
//! constructors, mutated through setters during a single configuration phase
//! and then rendered read-only, as often as needed.
//!
//! The model has no internal locking. Callers serialize all setter calls and
//! do not render while mutating (single writer, read after write).

pub mod user;

pub use user::User;

use crate::CloudInitError;
use crate::datasources::openstack::ConfigDriveMetadata;
use crate::datasources::ec2::Ec2Metadata;
use crate::datasources::gce::GceMetadata;
use crate::datasources::{DataSourceKind, ProviderMetadata};
use crate::network::{Interface, Interfaces, normalize_mac};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

/// Domain used for generated hostnames
pub const DEFAULT_DOMAIN: &str = "localdomain";

/// A file to write on first boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFile {
    pub path: String,
    pub content: Vec<u8>,
    /// Octal permission string, e.g. `0644`
    pub permissions: String,
    /// `user:group`, empty for the agent default
    pub owner: String,
    /// Emit as gzip + base64
    pub compress: bool,
}

/// Unified configuration model for all datasources
#[derive(Debug, Clone)]
pub struct SeedConfig {
    kind: DataSourceKind,
    fqdn: String,
    root_password: String,
    password_cost: u32,
    users: Vec<User>,
    interfaces: Interfaces,
    enable_guest_agent: bool,
    packages: Vec<String>,
    run_commands: Vec<String>,
    package_update: bool,
    package_upgrade: bool,
    password_changes: Vec<String>,
    expire_passwords: bool,
    timezone: String,
    locale: String,
    ssh_password_auth: bool,
    disable_root: bool,
    storage_devices: Vec<String>,
    mounts: Vec<Vec<String>>,
    write_files: Vec<WriteFile>,
    metadata: ProviderMetadata,
}

/// Fill a buffer from the OS entropy source
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CloudInitError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CloudInitError::Entropy(e.to_string()))?;
    Ok(bytes)
}

impl SeedConfig {
    /// Create a model for the given datasource with a random FQDN
    ///
    /// Fails only when the OS entropy source is unavailable.
    pub fn new(kind: DataSourceKind) -> Result<Self, CloudInitError> {
        let fqdn = format!(
            "vps-{}.{}",
            hex::encode(random_bytes::<10>()?),
            DEFAULT_DOMAIN
        );

        let metadata = match kind {
            DataSourceKind::NoCloud => ProviderMetadata::NoCloud,
            DataSourceKind::Ec2 => ProviderMetadata::Ec2(Ec2Metadata::default()),
            DataSourceKind::Gce => ProviderMetadata::Gce(GceMetadata::new()),
            DataSourceKind::ConfigDrive => {
                let uuid = uuid::Builder::from_random_bytes(random_bytes::<16>()?).into_uuid();
                ProviderMetadata::ConfigDrive(ConfigDriveMetadata::new(uuid.to_string()))
            }
        };

        debug!("Created {} seed config for {}", kind, fqdn);

        Ok(Self {
            kind,
            fqdn,
            root_password: String::new(),
            password_cost: user::DEFAULT_PASSWORD_COST,
            users: Vec::new(),
            interfaces: Interfaces::new(),
            enable_guest_agent: false,
            packages: Vec::new(),
            run_commands: Vec::new(),
            package_update: false,
            package_upgrade: false,
            password_changes: Vec::new(),
            expire_passwords: false,
            timezone: String::new(),
            locale: String::new(),
            ssh_password_auth: false,
            disable_root: false,
            storage_devices: Vec::new(),
            mounts: Vec::new(),
            write_files: Vec::new(),
            metadata,
        })
    }

    /// Create a NoCloud model
    pub fn new_nocloud() -> Result<Self, CloudInitError> {
        Self::new(DataSourceKind::NoCloud)
    }

    /// Create an EC2 model
    pub fn new_ec2() -> Result<Self, CloudInitError> {
        Self::new(DataSourceKind::Ec2)
    }

    /// Create a GCE model
    pub fn new_gce() -> Result<Self, CloudInitError> {
        Self::new(DataSourceKind::Gce)
    }

    /// Create an OpenStack ConfigDrive model
    pub fn new_config_drive() -> Result<Self, CloudInitError> {
        Self::new(DataSourceKind::ConfigDrive)
    }

    // ==================== Setters ====================

    /// Set the root password, stored verbatim
    ///
    /// Unlike user passwords this is not hashed: it lands in the
    /// `chpasswd` list exactly as given.
    pub fn set_root_password(&mut self, password: impl Into<String>) {
        self.root_password = password.into();
    }

    pub fn set_fqdn(&mut self, fqdn: impl Into<String>) {
        self.fqdn = fqdn.into();
    }

    /// Set the bcrypt cost used when users are added
    pub fn set_password_cost(&mut self, cost: u32) {
        self.password_cost = cost;
    }

    /// Add a user, hashing a plaintext password before it is stored
    ///
    /// On a hashing failure nothing is stored and the error is returned.
    pub fn add_user(&mut self, mut user: User) -> Result<(), CloudInitError> {
        user.hash_password(self.password_cost)?;
        debug!("Added user {}", user.name);
        self.users.push(user);
        Ok(())
    }

    /// Set a static address for the interface with the given MAC
    ///
    /// Setting the same MAC again replaces the previous entry.
    pub fn set_static_interface(
        &mut self,
        mac: &str,
        address: impl Into<String>,
        gateway: impl Into<String>,
        nameservers: &[&str],
    ) {
        let mac = normalize_mac(mac);
        let iface = Interface {
            address: address.into(),
            gateway: gateway.into(),
            nameservers: nameservers.iter().map(|ns| ns.to_string()).collect(),
        };
        if self.interfaces.insert(mac.clone(), iface).is_some() {
            debug!("Replaced interface {}", mac);
        }
    }

    /// Install and enable the QEMU guest agent on first boot
    pub fn enable_guest_agent(&mut self) {
        self.enable_guest_agent = true;
    }

    pub fn add_package(&mut self, package: impl Into<String>) {
        self.packages.push(package.into());
    }

    pub fn add_run_command(&mut self, command: impl Into<String>) {
        self.run_commands.push(command.into());
    }

    pub fn set_package_update(&mut self, update: bool) {
        self.package_update = update;
    }

    pub fn set_package_upgrade(&mut self, upgrade: bool) {
        self.package_upgrade = upgrade;
    }

    /// Add a `user:password` entry to the first-boot password change list
    pub fn add_password_change(&mut self, user: &str, password: &str) {
        self.password_changes.push(format!("{}:{}", user, password));
    }

    /// Force listed users to change their password at first login
    pub fn set_password_expiry(&mut self, expire: bool) {
        self.expire_passwords = expire;
    }

    pub fn set_timezone(&mut self, timezone: impl Into<String>) {
        self.timezone = timezone.into();
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
    }

    /// Allow password authentication over SSH for the root account
    pub fn enable_ssh_password_auth(&mut self) {
        self.ssh_password_auth = true;
    }

    pub fn disable_root_login(&mut self) {
        self.disable_root = true;
    }

    /// Grow the given partitions/mount points on first boot
    pub fn configure_storage<S: AsRef<str>>(&mut self, devices: &[S]) {
        self.storage_devices
            .extend(devices.iter().map(|d| d.as_ref().to_string()));
    }

    /// Add an fstab-style mount entry
    pub fn add_mount<S: AsRef<str>>(&mut self, fields: &[S]) {
        if fields.is_empty() {
            warn!("Ignoring empty mount entry");
            return;
        }
        self.mounts
            .push(fields.iter().map(|f| f.as_ref().to_string()).collect());
    }

    /// Write a file on first boot
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
        permissions: impl Into<String>,
    ) {
        self.push_file(path.into(), content.into(), permissions.into(), false);
    }

    /// Write a file on first boot, emitted gzip-compressed
    pub fn add_compressed_file(
        &mut self,
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
        permissions: impl Into<String>,
    ) {
        self.push_file(path.into(), content.into(), permissions.into(), true);
    }

    /// Set the owner of a previously added file
    pub fn set_file_owner(&mut self, path: &str, owner: impl Into<String>) -> bool {
        match self.write_files.iter_mut().rev().find(|f| f.path == path) {
            Some(file) => {
                file.owner = owner.into();
                true
            }
            None => false,
        }
    }

    fn push_file(&mut self, path: String, content: Vec<u8>, permissions: String, compress: bool) {
        self.write_files.push(WriteFile {
            path,
            content,
            permissions,
            owner: String::new(),
            compress,
        });
    }

    // ==================== Accessors ====================

    pub fn kind(&self) -> DataSourceKind {
        self.kind
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Instance id derived from the FQDN: the part before the first dot
    ///
    /// Falls back to the whole FQDN when there is no host part to split off.
    pub fn instance_id(&self) -> &str {
        match self.fqdn.split_once('.') {
            Some((host, _)) if !host.is_empty() => host,
            _ => &self.fqdn,
        }
    }

    pub fn root_password(&self) -> &str {
        &self.root_password
    }

    pub fn password_cost(&self) -> u32 {
        self.password_cost
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Interfaces in MAC order
    pub fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    pub fn guest_agent_enabled(&self) -> bool {
        self.enable_guest_agent
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn run_commands(&self) -> &[String] {
        &self.run_commands
    }

    pub fn package_update(&self) -> bool {
        self.package_update
    }

    pub fn package_upgrade(&self) -> bool {
        self.package_upgrade
    }

    pub fn password_changes(&self) -> &[String] {
        &self.password_changes
    }

    pub fn expire_passwords(&self) -> bool {
        self.expire_passwords
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn ssh_password_auth(&self) -> bool {
        self.ssh_password_auth
    }

    pub fn disable_root(&self) -> bool {
        self.disable_root
    }

    pub fn storage_devices(&self) -> &[String] {
        &self.storage_devices
    }

    pub fn mounts(&self) -> &[Vec<String>] {
        &self.mounts
    }

    pub fn write_files(&self) -> &[WriteFile] {
        &self.write_files
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ProviderMetadata {
        &mut self.metadata
    }
}

//! User entries and password hashing

use crate::CloudInitError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix shared by every crypt(3)-style hash (`$2b$`, `$6$`, ...)
pub const HASH_MARKER: char = '$';

/// Default bcrypt cost for user passwords
pub const DEFAULT_PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

/// A user to create on first boot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Login name
    pub name: String,
    /// Comma separated group list, passed through verbatim
    pub groups: String,
    pub shell: String,
    /// Sudo rule, e.g. `ALL=(ALL) NOPASSWD:ALL`
    pub sudo: String,
    pub ssh_authorized_keys: Vec<String>,
    /// Plaintext or crypt hash. Plaintext is hashed when the user is added.
    pub password: String,
    pub lock_password: bool,
    /// Allow password logins over SSH
    pub ssh_password_auth: bool,
}

impl User {
    /// Create a user with only a name set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_groups(mut self, groups: impl Into<String>) -> Self {
        self.groups = groups.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_sudo(mut self, sudo: impl Into<String>) -> Self {
        self.sudo = sudo.into();
        self
    }

    pub fn with_authorized_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_authorized_keys.push(key.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_lock_password(mut self, lock: bool) -> Self {
        self.lock_password = lock;
        self
    }

    pub fn with_ssh_password_auth(mut self, enabled: bool) -> Self {
        self.ssh_password_auth = enabled;
        self
    }

    /// Hash the password in place unless it is empty or already hashed
    pub(crate) fn hash_password(&mut self, cost: u32) -> Result<(), CloudInitError> {
        if self.password.is_empty() || is_hashed(&self.password) {
            return Ok(());
        }

        debug!("Hashing password for user {}", self.name);
        self.password = hash_password(&self.password, cost).map_err(|e| {
            CloudInitError::PasswordHash {
                user: self.name.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }
}

/// Check whether a password string is already a crypt hash
pub fn is_hashed(password: &str) -> bool {
    password.starts_with(HASH_MARKER)
}

/// Hash a plaintext password into an /etc/shadow compatible bcrypt string
///
/// bcrypt only reads the first 72 bytes, so longer passwords are rejected
/// instead of being silently cut.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::non_truncating_hash(plaintext, cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_has_marker() {
        let hash = hash_password("test123", 4).unwrap();
        assert!(hash.starts_with(HASH_MARKER));
        assert!(bcrypt::verify("test123", &hash).unwrap());
    }

    #[test]
    fn test_hash_in_place_skips_hashed() {
        let hashed = "$6$rounds=4096$salt$abcdef".to_string();
        let mut user = User::new("ops").with_password(hashed.clone());
        user.hash_password(4).unwrap();
        assert_eq!(user.password, hashed);
    }

    #[test]
    fn test_hash_in_place_skips_empty() {
        let mut user = User::new("ops");
        user.hash_password(4).unwrap();
        assert!(user.password.is_empty());
    }

    #[test]
    fn test_password_over_72_bytes_is_rejected() {
        let prefix = "a".repeat(72);
        let mut user = User::new("ops").with_password(format!("{prefix}SECRET-TAIL"));
        let err = user.hash_password(4).unwrap_err();
        assert!(matches!(err, CloudInitError::PasswordHash { ref user, .. } if user == "ops"));
        assert!(!is_hashed(&user.password));

        let mut user = User::new("ops").with_password(prefix.clone());
        user.hash_password(4).unwrap();
        assert!(bcrypt::verify(&prefix, &user.password).unwrap());
    }

    #[test]
    fn test_invalid_cost_is_reported() {
        let mut user = User::new("ops").with_password("pw1");
        let err = user.hash_password(1).unwrap_err();
        assert!(matches!(err, CloudInitError::PasswordHash { ref user, .. } if user == "ops"));
        assert_eq!(user.password, "pw1");
    }
}

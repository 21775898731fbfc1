//! Connection configuration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable prefix used by [`SftpConfig::from_env`]
pub const ENV_PREFIX: &str = "SFTP";

/// SFTP connection configuration
///
/// Immutable once the client is built; every reconnect dials with the same
/// values.
#[derive(Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for password authentication
    pub username: String,

    pub password: String,

    /// Pinned host key as `"<key-type> <base64>"`
    ///
    /// `None` or an empty string accepts any host key and logs the observed
    /// one. This is insecure and only meant for capturing the key to pin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_host_key: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// SSH keepalive interval in seconds (disabled when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_secs: Option<u64>,
}

impl SftpConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_trusted_host_key(mut self, key: impl Into<String>) -> Self {
        self.trusted_host_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// `host:port` dial address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pinned key, treating an empty string as unset
    pub fn trusted_key(&self) -> &str {
        self.trusted_host_key.as_deref().unwrap_or_default()
    }

    /// Load from `SFTP_HOST`, `SFTP_PORT`, `SFTP_USER`, `SFTP_PASSWORD`,
    /// `SFTP_TRUSTED_HOST_KEY` and `SFTP_CONNECT_TIMEOUT_SECS`.
    ///
    /// Missing variables fall back to the defaults; unparsable numbers are
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            username: lookup("USER").unwrap_or(defaults.username),
            password: lookup("PASSWORD").unwrap_or(defaults.password),
            trusted_host_key: lookup("TRUSTED_HOST_KEY").filter(|k| !k.is_empty()),
            timeout_secs: lookup("CONNECT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            keepalive_secs: None,
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            trusted_host_key: None,
            timeout_secs: 30,
            keepalive_secs: None,
        }
    }
}

impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("trusted_host_key", &self.trusted_host_key)
            .field("timeout_secs", &self.timeout_secs)
            .field("keepalive_secs", &self.keepalive_secs)
            .finish()
    }
}

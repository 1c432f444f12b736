//! Declarative server bootstrap configuration.
//!
//! ```toml
//! protocol = "https"
//! host = "0.0.0.0"
//! port = 8443
//! root_path = "/api"
//! client_auth = "optional"
//!
//! [tls]
//! cert_path = "certs/server.pem"
//! key_path = "certs/server.key"
//! ca_path = "certs/clients-ca.pem"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::loader::load_toml;
use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

/// Whether TLS clients must present a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuth {
    #[default]
    None,
    Optional,
    Mandatory,
}

/// PEM files backing the server's TLS context.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsFiles {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Roots used to verify client certificates.
    pub ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub root_path: String,
    pub tls: Option<TlsFiles>,
    pub client_auth: ClientAuth,
    pub auto_start: bool,
    pub shutdown_grace_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            root_path: "/".to_string(),
            tls: None,
            client_auth: ClientAuth::None,
            auto_start: true,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl BootstrapConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Plain HTTP on `host:port`.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "host".to_string(),
                value: self.host.clone(),
                reason: "must not be empty",
            });
        }
        if !self.root_path.is_empty() && !self.root_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "root_path".to_string(),
                value: self.root_path.clone(),
                reason: "must start with '/'",
            });
        }
        if self.client_auth != ClientAuth::None && self.protocol == Protocol::Http {
            return Err(ConfigError::InvalidValue {
                key: "client_auth".to_string(),
                value: format!("{:?}", self.client_auth).to_lowercase(),
                reason: "requires protocol https",
            });
        }
        Ok(())
    }

    /// `host:port` as given.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Mount point of the application, `None` when served at the root.
    pub fn mount_path(&self) -> Option<String> {
        let trimmed = self.root_path.trim_end_matches('/');
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

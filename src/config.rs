//! Configuration parsing and validation
//!
//! The config file is YAML with three sections: `server`, `ssl` and `proxy`.
//! Validation happens at load time so the proxy never starts with an SSL
//! listener that has no certificate or an authorization gate without a
//! readable credential file.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Error, Result};

/// Address used when `server.addr` is absent or empty.
pub const DEFAULT_ADDR: &str = ":3128";

pub const SSL_CERT_REQUIRED: &str = "pem and key files is required if 'ssl enable:true'";
pub const CREDENTIALS_NOT_SET: &str =
    "htpasswd file path should be provided if authorization enabled";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ssl: SslConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address; `:port` binds every interface
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

impl ServerConfig {
    /// Resolve the configured address into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        };

        addr.parse()
            .map_err(|e| Error::config(format!("Invalid server address '{}': {}", self.addr, e)))
    }

    fn validate(&mut self) -> Result<()> {
        if self.addr.is_empty() {
            tracing::warn!(
                default = DEFAULT_ADDR,
                "server address is not specified, using the default"
            );
            self.addr = default_addr();
        }
        Ok(())
    }
}

/// TLS listener settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SslConfig {
    #[serde(default)]
    pub enabled: bool,

    /// PEM certificate chain
    #[serde(default)]
    pub pem: Option<String>,

    /// PEM private key
    #[serde(default)]
    pub key: Option<String>,
}

impl SslConfig {
    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let (Some(pem), Some(key)) = (non_empty(&self.pem), non_empty(&self.key)) else {
            return Err(Error::config(SSL_CERT_REQUIRED));
        };

        for path in [key, pem] {
            if let Err(e) = std::fs::read(path) {
                tracing::error!(path = %path, error = %e, "unable to read the cert file");
                return Err(Error::config(SSL_CERT_REQUIRED));
            }
        }
        Ok(())
    }
}

/// Proxy behaviour settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Log every forwarded request
    #[serde(default)]
    pub logging: bool,

    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

/// Basic proxy authorization settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// htpasswd-style credential file
    #[serde(default)]
    pub passwdfile: Option<String>,
}

impl AuthorizationConfig {
    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let Some(path) = non_empty(&self.passwdfile) else {
            return Err(Error::config(CREDENTIALS_NOT_SET));
        };

        if let Err(e) = std::fs::read(path) {
            tracing::error!(path = %path, error = %e, "unable to read the auth file");
            return Err(Error::config(CREDENTIALS_NOT_SET));
        }
        Ok(())
    }

    /// The credential file path, when authorization is switched on.
    pub fn enabled_passwdfile(&self) -> Option<&str> {
        if self.enabled {
            non_empty(&self.passwdfile)
        } else {
            None
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| Error::config(format!("Invalid YAML: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate every section in order: ssl, server, authorization.
    pub fn validate(&mut self) -> Result<()> {
        self.ssl.validate()?;
        self.server.validate()?;
        self.proxy.authorization.validate()?;
        Ok(())
    }
}

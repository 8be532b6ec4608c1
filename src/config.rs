use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cert::params::{DistinguishedName, MAX_VALIDITY_DAYS};
use crate::error::{CaError, Result};
use crate::key::KeyAlgorithm;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Upper bound on a single frame, whatever the configuration says.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub ca: CaConfig,
    pub request: RequestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub io_timeout_ms: u64,
    pub max_request_bytes: usize,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    /// Lifetime of issued certificates.
    pub validity_days: u32,
}

/// Defaults used when generating a key and signing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub key_algorithm: KeyAlgorithm,
    pub subject: DistinguishedName,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            key_path: PathBuf::from("server.key"),
            cert_path: PathBuf::from("server.crt"),
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            key_algorithm: KeyAlgorithm::default(),
            subject: DistinguishedName::builder()
                .country("US")
                .state("MI")
                .organization("Grand Valley State University")
                .organization_unit("IT")
                .common_name("www.gvsu.edu")
                .build(),
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CaError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CaError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.ca.validate()?;

        if self.request.subject.common_name.is_empty() {
            return Err(CaError::ConfigError(
                "request.subject.common_name cannot be empty".to_string(),
            ));
        }
        self.request
            .subject
            .to_x509_name()
            .map_err(|e| CaError::ConfigError(format!("request.subject: {e}")))?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.io_timeout_ms == 0 {
            return Err(CaError::ConfigError(
                "server.io_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_request_bytes == 0 || self.max_request_bytes > MAX_FRAME_BYTES {
            return Err(CaError::ConfigError(format!(
                "server.max_request_bytes must be between 1 and {MAX_FRAME_BYTES}"
            )));
        }
        if self.max_connections == 0 {
            return Err(CaError::ConfigError(
                "server.max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| CaError::ConfigError(format!("server.listen {:?}: {e}", self.listen)))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl CaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key_path.as_os_str().is_empty() || self.cert_path.as_os_str().is_empty() {
            return Err(CaError::ConfigError(
                "ca.key_path and ca.cert_path cannot be empty".to_string(),
            ));
        }
        if self.validity_days == 0 || self.validity_days > MAX_VALIDITY_DAYS {
            return Err(CaError::ConfigError(format!(
                "ca.validity_days must be between 1 and {MAX_VALIDITY_DAYS}"
            )));
        }
        Ok(())
    }

    pub fn lifetime(&self) -> time::Duration {
        time::Duration::days(i64::from(self.validity_days))
    }
}

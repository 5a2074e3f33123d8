//! Service configuration loaded from TOML.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

use jammer_core::MessageRouting;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{}: ota channel group {group} is not an IPv4 multicast address", .path.display())]
    NotMulticast { path: PathBuf, group: Ipv4Addr },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Address the control listener binds to.
    pub endpoint: SocketAddr,
    pub ota_channel: OtaChannelConfig,
    pub ota_message: OtaMessageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Multicast channel that carries transmission frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OtaChannelConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// IPv4 address of the interface frames are sent from. The sending
    /// socket binds to it, which selects the outgoing interface. Interface
    /// names such as `eth1` are not accepted.
    #[serde(default)]
    pub device: Option<Ipv4Addr>,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default = "default_true")]
    pub loopback: bool,
}

impl OtaChannelConfig {
    #[must_use]
    pub fn target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }
}

/// Addressing copied into every transmission.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OtaMessageConfig {
    pub destination: u16,
    pub registration_id: u16,
    pub sub_id: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `jammer_service=debug`.
    #[serde(default)]
    pub level: Option<String>,
}

fn default_ttl() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Parses configuration text; `path` is only used in error messages.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if !config.ota_channel.group.is_multicast() {
            return Err(ConfigError::NotMulticast {
                path: path.to_path_buf(),
                group: config.ota_channel.group,
            });
        }

        Ok(config)
    }

    #[must_use]
    pub fn routing(&self) -> MessageRouting {
        MessageRouting::new(
            self.ota_message.destination,
            self.ota_message.registration_id,
            self.ota_message.sub_id,
        )
    }
}

//! Configuration for surfacewire hosts and surfaces.
//!
//! Loaded from `~/.surfacewire/config.toml` unless a path is given. Every
//! field has a default, and an unreadable or malformed file falls back to the
//! defaults with a warning.

use crate::permission::PermissionTable;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default TCP address for the host listener.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4810";

/// Maximum single frame size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Default tracing filter.
    pub log_level: String,
    /// Address the host listens on, and the address surfaces connect to.
    pub listen_addr: SocketAddr,
    /// Largest frame either side accepts.
    pub max_message_size: u32,
    /// Name a surface announces in its handshake.
    pub surface_name: String,
    /// Permission table used when a surface builds its proxy.
    pub permissions: PermissionTable,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 4810)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            surface_name: "surface".to_string(),
            permissions: PermissionTable::new(),
        }
    }
}

/// `~/.surfacewire`, or `./.surfacewire` when no home directory is known.
pub fn surfacewire_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".surfacewire")
}

fn default_config_path() -> PathBuf {
    surfacewire_home().join("config.toml")
}

/// Load configuration from a TOML file, with defaults.
pub fn load_config(path: Option<&Path>) -> WireConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return WireConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<WireConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                WireConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            WireConfig::default()
        }
    }
}

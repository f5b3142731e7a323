//! Console configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/aera/console.toml`
//! - Windows: `%APPDATA%/aera/console.toml`

use std::path::{Path, PathBuf};

use aera_connection::LinkConfig;
use serde::{Deserialize, Serialize};

/// Console configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Connect as soon as the console starts.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Controller endpoint and link timings.
    #[serde(default)]
    pub link: LinkConfig,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_connect: default_true(),
            link: LinkConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or creates a default file there if
    /// none exists.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line overrides. They are not written back.
    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.link.endpoint.host = host;
        }
        if let Some(port) = port {
            self.link.endpoint.port = port;
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("aera").join("console.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("aera")
            .join("console.toml")
    }
}

// Configuration management for halftime
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_directory: PathBuf,
    pub gateway: GatewayConfig,
    pub device: DeviceConfig,
    pub session: SessionConfig,
    pub export: ExportConfig,
}

/// Where the playback backend lives and how to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub status_path: String,
    pub login_path: String,
    /// Copied from the browser after logging in; sent as the `Cookie` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Connect device to bind to; None = whichever is active (or first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub api_base: String,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub window_seconds: u32,
    pub fallback_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:10000".to_string(),
            api_prefix: "/spotify".to_string(),
            status_path: "/me/token".to_string(),
            login_path: "/login".to_string(),
            session_cookie: None,
            timeout_secs: 15,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: None,
            api_base: "https://api.spotify.com/v1".to_string(),
            poll_interval_secs: 5,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_seconds: 45,
            fallback_duration_ms: 30_000,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            file_prefix: "spotify_notes".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("halftime");

        Self {
            log_directory: data_dir.join("logs"),
            gateway: GatewayConfig::default(),
            device: DeviceConfig::default(),
            session: SessionConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }
}

impl Config {
    /// Load from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("halftime");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_written_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.session.window_seconds, 45);
        assert_eq!(config.session.fallback_duration_ms, 30_000);
        assert_eq!(config.export.file_prefix, "spotify_notes");
    }

    #[test]
    fn test_saved_values_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.session.window_seconds = 20;
        config.device.name = Some("Kitchen".to_string());
        config.gateway.session_cookie = Some("session=abc".to_string());
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.session.window_seconds, 20);
        assert_eq!(reloaded.device.name.as_deref(), Some("Kitchen"));
        assert_eq!(reloaded.gateway.session_cookie.as_deref(), Some("session=abc"));
    }

    #[test]
    fn test_login_url() {
        let gateway = GatewayConfig {
            base_url: "https://notes.example.com/".to_string(),
            ..GatewayConfig::default()
        };
        assert_eq!(gateway.login_url(), "https://notes.example.com/login");
    }

    #[test]
    fn test_broken_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "gateway = 3").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}

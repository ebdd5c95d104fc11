//! Helper configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default control socket location
pub const DEFAULT_SOCKET_PATH: &str = "/run/yubiswitch/helper.sock";

/// System-wide configuration file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/yubiswitch-helper/helper.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelperConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Control socket path (`~` is expanded)
    #[serde(default = "ServerSettings::default_socket_path")]
    pub socket_path: String,
    /// Socket permission bits as an octal string, e.g. "0660"
    #[serde(default = "ServerSettings::default_socket_mode")]
    pub socket_mode: String,
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: Self::default_socket_path(),
            socket_mode: Self::default_socket_mode(),
            log_level: Self::default_log_level(),
        }
    }
}

impl ServerSettings {
    fn default_socket_path() -> String {
        DEFAULT_SOCKET_PATH.to_string()
    }

    fn default_socket_mode() -> String {
        "0660".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Socket path with `~` and environment variables expanded
    pub fn socket_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.socket_path)
            .with_context(|| format!("Failed to expand socket path '{}'", self.socket_path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Parsed socket permission bits
    pub fn socket_mode(&self) -> Result<u32> {
        parse_mode(&self.socket_mode)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Upper bound on one wait for hot-plug notifications, in milliseconds
    #[serde(default = "UsbSettings::default_event_tick_ms")]
    pub event_tick_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            event_tick_ms: Self::default_event_tick_ms(),
        }
    }
}

impl UsbSettings {
    /// Longest accepted tick; commands wait at most one tick to be picked up
    pub const MAX_EVENT_TICK_MS: u64 = 5_000;

    fn default_event_tick_ms() -> u64 {
        100
    }

    pub fn event_tick(&self) -> Duration {
        Duration::from_millis(self.event_tick_ms)
    }
}

fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode
        .strip_prefix("0o")
        .or_else(|| mode.strip_prefix("0O"))
        .unwrap_or(mode);

    let bits = u32::from_str_radix(digits, 8)
        .map_err(|_| anyhow!("Invalid socket mode '{}', expected octal like \"0660\"", mode))?;

    if bits > 0o777 {
        return Err(anyhow!(
            "Invalid socket mode '{}', only permission bits (up to 0777) are allowed",
            mode
        ));
    }
    if bits & 0o600 != 0o600 {
        return Err(anyhow!(
            "Invalid socket mode '{}', owner needs read and write access",
            mode
        ));
    }

    Ok(bits)
}

impl HelperConfig {
    /// Load configuration from the specified path, or the first standard
    /// location that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(&Self::candidate_paths())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HelperConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first configuration file among `candidates`, or defaults
    /// when none exists
    ///
    /// A file that exists but cannot be read or validated is an error.
    /// Returns the path the configuration came from.
    pub fn load_or_default(candidates: &[PathBuf]) -> Result<(Self, Option<PathBuf>)> {
        match Self::find_config_file(candidates) {
            Some(path) => {
                let config = Self::load(Some(path.clone()))?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Standard configuration locations, most specific first
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![Self::default_path(), PathBuf::from(SYSTEM_CONFIG_PATH)]
    }

    fn find_config_file(candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find(|p| p.exists()).cloned()
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("yubiswitch-helper").join("helper.toml")
        } else {
            PathBuf::from(SYSTEM_CONFIG_PATH)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.server.socket_path.trim().is_empty() {
            return Err(anyhow!("socket_path must not be empty"));
        }

        self.server.socket_mode()?;

        if self.usb.event_tick_ms == 0 || self.usb.event_tick_ms > UsbSettings::MAX_EVENT_TICK_MS {
            return Err(anyhow!(
                "Invalid event_tick_ms {}, must be between 1 and {}",
                self.usb.event_tick_ms,
                UsbSettings::MAX_EVENT_TICK_MS
            ));
        }

        Ok(())
    }
}

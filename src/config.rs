//! Application configuration
//!
//! Every setting lives in an explicit struct that is handed by value to the
//! component that needs it. The on-disk form is TOML in the platform config
//! directory; missing files fall back to defaults.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

const APP_QUALIFIER: &str = "org";
const APP_AUTHOR: &str = "lan-screen-mirror";
const APP_NAME: &str = "lan-screen-mirror";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
    pub supervisor: SupervisorConfig,
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
            .ok_or(ConfigError::MissingProjectDirs)?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path`, or return defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.sender.validate()?;
        self.receiver.validate()?;
        self.supervisor.validate()
    }
}

/// Discovery settings shared by both hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub discovery_port: u16,
    pub discovery_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl NetworkConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_port("network.discovery_port", self.discovery_port)?;
        if self.discovery_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "network.discovery_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Capture host settings: where to send and how to encode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Encoder executable
    pub executable: String,
    pub receiver_ip: String,
    pub receiver_port: u16,
    /// `width:height`, or `None` for native capture resolution
    pub scaling_resolution: Option<String>,
    pub fps: u32,
    /// AVFoundation video device index
    pub screen_index: String,
    /// AVFoundation audio device index, `none` to disable
    pub audio_index: String,
    pub preset: String,
    pub tune: String,
    pub bitrate: String,
    pub gop_size: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            executable: "ffmpeg".to_string(),
            receiver_ip: "192.168.1.100".to_string(),
            receiver_port: DEFAULT_STREAM_PORT,
            scaling_resolution: Some("1280:720".to_string()),
            fps: 30,
            screen_index: "1".to_string(),
            audio_index: "none".to_string(),
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            bitrate: "5000k".to_string(),
            gop_size: 30,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_executable("sender.executable", &self.executable)?;
        validate_host("sender.receiver_ip", &self.receiver_ip)?;
        validate_port("sender.receiver_port", self.receiver_port)?;

        if self.fps == 0 {
            return Err(ConfigError::invalid("sender.fps", "must be greater than zero"));
        }
        if self.gop_size == 0 {
            return Err(ConfigError::invalid(
                "sender.gop_size",
                "must be greater than zero",
            ));
        }
        if let Some(resolution) = &self.scaling_resolution {
            validate_resolution(resolution)?;
        }
        Ok(())
    }

    /// Apply the environment overrides understood by the sender
    /// (`OSD_RECEIVER_IP`, `OSD_RECEIVER_PORT`, `OSD_SCALING_RESOLUTION`).
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(ip) = std::env::var("OSD_RECEIVER_IP") {
            self.receiver_ip = ip;
        }
        if let Ok(port) = std::env::var("OSD_RECEIVER_PORT") {
            self.receiver_port = port.parse().map_err(|_| {
                ConfigError::invalid("OSD_RECEIVER_PORT", format!("'{port}' is not a port"))
            })?;
        }
        if let Ok(resolution) = std::env::var("OSD_SCALING_RESOLUTION") {
            // Empty means native resolution
            self.scaling_resolution = (!resolution.is_empty()).then_some(resolution);
        }
        Ok(())
    }
}

/// Playback host settings: where to listen and how to play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Player executable
    pub executable: String,
    /// `0.0.0.0` listens on every interface
    pub listen_ip: String,
    pub port: u16,
    pub fullscreen: bool,
    pub window_title: String,
    pub fflags: String,
    /// Bytes probed before playback starts
    pub probesize: String,
    /// Microseconds analyzed before playback starts
    pub analyzeduration: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            executable: "ffplay".to_string(),
            listen_ip: "0.0.0.0".to_string(),
            port: DEFAULT_STREAM_PORT,
            fullscreen: true,
            window_title: "Screen Mirror Receiver".to_string(),
            fflags: "nobuffer".to_string(),
            probesize: "32".to_string(),
            analyzeduration: "0".to_string(),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_executable("receiver.executable", &self.executable)?;
        validate_host("receiver.listen_ip", &self.listen_ip)?;
        validate_port("receiver.port", self.port)
    }
}

/// Restart and shutdown timing for stream supervisors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub cooldown_ms: u64,
    pub error_cooldown_ms: u64,
    pub stop_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            error_cooldown_ms: DEFAULT_ERROR_COOLDOWN.as_millis() as u64,
            stop_grace_ms: DEFAULT_STOP_GRACE.as_millis() as u64,
        }
    }
}

impl SupervisorConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_grace_ms == 0 {
            return Err(ConfigError::invalid(
                "supervisor.stop_grace_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn validate_port(field: &'static str, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::invalid(field, "port must be non-zero"));
    }
    Ok(())
}

fn validate_host(field: &'static str, host: &str) -> Result<(), ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::invalid(field, "address is empty"));
    }
    if host.chars().any(|c| c.is_whitespace() || c == '/' || c == '?') {
        return Err(ConfigError::invalid(field, format!("'{host}' is not a host address")));
    }
    Ok(())
}

fn validate_executable(field: &'static str, executable: &str) -> Result<(), ConfigError> {
    if executable.trim().is_empty() {
        return Err(ConfigError::invalid(field, "executable is empty"));
    }
    Ok(())
}

fn validate_resolution(resolution: &str) -> Result<(), ConfigError> {
    let valid = resolution
        .split_once(':')
        .map(|(w, h)| {
            let dim = |s: &str| s.parse::<u32>().map(|v| v > 0).unwrap_or(false) || s == "-1";
            dim(w) && dim(h)
        })
        .unwrap_or(false);

    if !valid {
        return Err(ConfigError::invalid(
            "sender.scaling_resolution",
            format!("'{resolution}' is not width:height"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut config = ReceiverConfig::default();
        config.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "receiver.port", .. })
        ));
    }

    #[test]
    fn test_rejects_empty_receiver_ip() {
        let mut config = SenderConfig::default();
        config.receiver_ip = "  ".to_string();
        assert!(config.validate().is_err());

        config.receiver_ip = "10.0.0.5/24".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolution_format() {
        let mut config = SenderConfig::default();
        config.scaling_resolution = Some("1920:1080".to_string());
        assert!(config.validate().is_ok());

        config.scaling_resolution = Some("1280:-1".to_string());
        assert!(config.validate().is_ok());

        config.scaling_resolution = Some("1920x1080".to_string());
        assert!(config.validate().is_err());

        config.scaling_resolution = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.sender.receiver_ip = "10.0.0.5".to_string();
        config.receiver.fullscreen = false;
        config.supervisor.cooldown_ms = 250;
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[receiver]\nport = 23456\n").unwrap();

        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.receiver.port, 23456);
        assert_eq!(loaded.receiver.executable, "ffplay");
        assert_eq!(loaded.network, NetworkConfig::default());
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[receiver\nport = ").unwrap();

        assert!(matches!(
            AppConfig::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}

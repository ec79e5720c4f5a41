//! Error types for the screen mirroring application

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors, raised before any socket or process is touched
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Unable to determine the configuration directory")]
    MissingProjectDirs,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },

    #[error("Socket option failed: {0}")]
    SocketOption(std::io::Error),

    #[error("Send failed: {0}")]
    SendFailed(std::io::Error),

    #[error("Address resolution failed: {0}")]
    AddressResolution(String),
}

/// Stream session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Not a runnable executable: {0}")]
    NotExecutable(String),

    #[error("Failed to launch {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to wait for media process: {0}")]
    Wait(std::io::Error),

    #[error("Internal supervisor error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether retrying the same launch can ever succeed without operator action
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ExecutableNotFound(_) | Self::NotExecutable(_))
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

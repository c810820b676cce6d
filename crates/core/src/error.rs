//! Error types for avdkit core
//!
//! Configuration and environment failures shared by every crate.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Io(e) => format!("File operation failed: {}", e),
            CoreError::TomlParse { path, .. } => {
                format!("Configuration file {} is not valid TOML", path.display())
            }
            CoreError::Config(msg) => format!("Configuration error: {}", msg),
            _ => self.to_string(),
        }
    }
}

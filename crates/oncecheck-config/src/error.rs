//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to merge configuration: {0}")]
    Merge(#[from] config::ConfigError),

    #[error("Invalid configuration: {field} {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Failed to render configuration as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("XDG directory error: {0}")]
    Xdg(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

//! Configuration loader with multi-source merging

use crate::{HarnessConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
    env_source: Option<config::Map<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "ONCECHECK".to_string(),
            include_user_config: true,
            env_source: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "ONCECHECK")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/oncecheck/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Read environment overrides from `vars` instead of the process
    /// environment.
    #[cfg(test)]
    pub(crate) fn with_env_source(mut self, vars: config::Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Load configuration from all sources with proper precedence, then validate
    pub fn load(self) -> Result<HarnessConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = HarnessConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User config, oncecheck.toml, oncecheck.local.toml
        let paths = Paths::new();
        for file in paths.existing_config_files(&self.project_dir, self.include_user_config) {
            tracing::debug!(file = %file.display(), "merging configuration file");
            builder = builder.add_source(
                config::File::from(file)
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (ONCECHECK_MESSAGE_COUNT, ...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .try_parsing(true)
                .source(self.env_source.clone()),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let harness_config: HarnessConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        harness_config
            .validate()
            .context("Configuration rejected")?;

        tracing::debug!(
            project_dir = %self.project_dir.display(),
            units = harness_config.number_of_units,
            messages = harness_config.message_count,
            "configuration loaded"
        );

        Ok(harness_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

//! Configuration management for oncecheck
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (ONCECHECK_* prefix)
//! 3. oncecheck.local.toml (gitignored, local overrides)
//! 4. oncecheck.toml (git-tracked, project config)
//! 5. ~/.config/oncecheck/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)
//!
//! A host runtime that hands over its global configuration as a flat string
//! map uses [`HarnessConfig::from_key_values`] instead. Unknown keys are
//! ignored on every path.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Largest accepted `max_send_after_delay_ms`: one day.
pub const MAX_SEND_AFTER_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Keys recognized by [`HarnessConfig`], in canonical snake_case form.
pub const KNOWN_KEYS: &[&str] = &[
    "number_of_units",
    "command_depth",
    "message_count",
    "max_failures",
    "max_commands_per_depth",
    "state_modification_pr",
    "send_pr",
    "send_after_pr",
    "async_send_pr",
    "noop_pr",
    "send_egress_pr",
    "max_send_after_delay_ms",
    "sweep_interval_ms",
    "idle_before_verify_ms",
    "seed",
];

/// Older spellings accepted from flat key/value maps.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("number_of_function_instances", "number_of_units"),
    ("state_modifications_pr", "state_modification_pr"),
    ("sleep_time_before_verify_ms", "idle_before_verify_ms"),
    ("sleep_time_after_verify_ms", "sweep_interval_ms"),
];

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of independently addressable units.
    pub number_of_units: u32,
    /// Maximum nesting depth of a generated command tree.
    pub command_depth: u32,
    /// Number of command trees to generate before verifying.
    pub message_count: u64,
    /// Failure budget across all restarts.
    pub max_failures: u32,
    /// Maximum children of a forwarding command.
    pub max_commands_per_depth: u32,
    pub state_modification_pr: f64,
    pub send_pr: f64,
    pub send_after_pr: f64,
    pub async_send_pr: f64,
    pub noop_pr: f64,
    pub send_egress_pr: f64,
    /// Upper bound of the `SendAfter` delay, in milliseconds. At most
    /// [`MAX_SEND_AFTER_DELAY_MS`].
    pub max_send_after_delay_ms: u64,
    /// Idle time between verification sweeps.
    pub sweep_interval_ms: u64,
    /// Idle time between the end of generation and the first sweep.
    pub idle_before_verify_ms: u64,
    /// Seed for the workload random stream. Entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            number_of_units: 1_000,
            command_depth: 10,
            message_count: 100_000,
            max_failures: 1,
            max_commands_per_depth: 3,
            state_modification_pr: 0.30,
            send_pr: 0.45,
            send_after_pr: 0.05,
            async_send_pr: 0.05,
            noop_pr: 0.13,
            send_egress_pr: 0.02,
            max_send_after_delay_ms: 100,
            sweep_interval_ms: 2_000,
            idle_before_verify_ms: 120_000,
            seed: None,
        }
    }
}

/// Normalized command-kind weights.
///
/// Produced by [`HarnessConfig::probabilities`]. The six weights always sum
/// to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandProbabilities {
    pub state_modification: f64,
    pub send: f64,
    pub send_after: f64,
    pub async_send: f64,
    pub noop: f64,
    pub send_egress: f64,
}

impl CommandProbabilities {
    /// Probabilities that always pick `StateModification`.
    pub fn state_modification_only() -> Self {
        Self {
            state_modification: 1.0,
            send: 0.0,
            send_after: 0.0,
            async_send: 0.0,
            noop: 0.0,
            send_egress: 0.0,
        }
    }

    /// Weights in draw order: state modification, send, send-after,
    /// async send, noop, egress.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.state_modification,
            self.send,
            self.send_after,
            self.async_send,
            self.noop,
            self.send_egress,
        ]
    }
}

impl HarnessConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Builds a validated configuration from a flat string map.
    ///
    /// Keys may be camelCase (`numberOfUnits`) or snake_case
    /// (`number_of_units`). Unknown keys are ignored.
    pub fn from_key_values<I, K, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        for (key, value) in entries {
            let key = canonical_key(key.as_ref());
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::debug!(key = %key, "ignoring unknown configuration key");
                continue;
            }
            builder = builder.set_override(key, value.into())?;
        }

        let harness_config: Self = builder.build()?.try_deserialize()?;
        harness_config.validate()?;
        Ok(harness_config)
    }

    /// Creates a small configuration suited to quick local runs.
    pub fn local() -> Self {
        Self {
            number_of_units: 16,
            command_depth: 4,
            message_count: 2_000,
            sweep_interval_ms: 100,
            idle_before_verify_ms: 0,
            ..Default::default()
        }
    }

    /// Checks ranges and probabilities. Never partially accepts a config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_units == 0 {
            return Err(ConfigError::invalid("number_of_units", "must be positive"));
        }
        if self.message_count == 0 {
            return Err(ConfigError::invalid("message_count", "must be positive"));
        }
        if self.max_commands_per_depth == 0 {
            return Err(ConfigError::invalid(
                "max_commands_per_depth",
                "must be positive",
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::invalid("sweep_interval_ms", "must be positive"));
        }
        if !(1..=MAX_SEND_AFTER_DELAY_MS).contains(&self.max_send_after_delay_ms) {
            return Err(ConfigError::invalid(
                "max_send_after_delay_ms",
                format!("must be within [1, {MAX_SEND_AFTER_DELAY_MS}]"),
            ));
        }

        let named = [
            ("state_modification_pr", self.state_modification_pr),
            ("send_pr", self.send_pr),
            ("send_after_pr", self.send_after_pr),
            ("async_send_pr", self.async_send_pr),
            ("noop_pr", self.noop_pr),
            ("send_egress_pr", self.send_egress_pr),
        ];
        for (field, value) in named {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be within [0, 1], got {value}"),
                ));
            }
        }

        let total: f64 = named.iter().map(|(_, value)| value).sum();
        if total <= 0.0 {
            return Err(ConfigError::invalid(
                "probabilities",
                "at least one command probability must be positive",
            ));
        }
        if total > 1.0 {
            tracing::warn!(total, "command probabilities sum above 1, renormalizing");
        }

        Ok(())
    }

    /// Returns the command-kind weights, normalized to sum to 1.
    ///
    /// When the configured probabilities sum to less than 1 the remainder is
    /// added to `noop`; when they sum to more than 1 every weight is scaled
    /// down proportionally.
    pub fn probabilities(&self) -> CommandProbabilities {
        let total = self.state_modification_pr
            + self.send_pr
            + self.send_after_pr
            + self.async_send_pr
            + self.noop_pr
            + self.send_egress_pr;
        let scale = total.max(1.0);
        let remainder = (1.0 - total).max(0.0);

        CommandProbabilities {
            state_modification: self.state_modification_pr / scale,
            send: self.send_pr / scale,
            send_after: self.send_after_pr / scale,
            async_send: self.async_send_pr / scale,
            noop: (self.noop_pr + remainder) / scale,
            send_egress: self.send_egress_pr / scale,
        }
    }

    /// Sets every probability so that only `StateModification` is drawn.
    pub fn with_state_modification_only(mut self) -> Self {
        self.state_modification_pr = 1.0;
        self.send_pr = 0.0;
        self.send_after_pr = 0.0;
        self.async_send_pr = 0.0;
        self.noop_pr = 0.0;
        self.send_egress_pr = 0.0;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn idle_before_verify(&self) -> Duration {
        Duration::from_millis(self.idle_before_verify_ms)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Maps `numberOfUnits`, `number-of-units` and legacy spellings to the
/// canonical snake_case key.
fn canonical_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len() + 4);
    for (i, ch) in raw.trim().chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 && !key.ends_with('_') {
                key.push('_');
            }
            key.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch == '.' {
            key.push('_');
        } else {
            key.push(ch);
        }
    }

    LEGACY_KEYS
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map_or(key, |(_, canonical)| (*canonical).to_string())
}

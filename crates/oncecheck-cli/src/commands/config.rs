//! Configuration command.

use std::path::Path;

use anyhow::{Context, Result};
use oncecheck_config::HarnessConfig;

/// Prints the merged, validated configuration.
pub fn show(project_dir: &Path) -> Result<()> {
    let config =
        HarnessConfig::load_from_dir(project_dir).context("Failed to load configuration")?;
    let rendered = config
        .to_toml_string()
        .context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

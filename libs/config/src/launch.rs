//! Launch file loading

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use types::LaunchDescription;

/// Parse a launch description, choosing the format by file extension.
///
/// `.json`, `.yml`/`.yaml`; anything else is read as TOML.
pub fn load_launch_file(path: &Path) -> Result<LaunchDescription> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read launch file {:?}", path))?;

    let description: LaunchDescription = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&contents).context("Invalid JSON launch file")?,
        Some("yml") | Some("yaml") => {
            serde_yaml::from_str(&contents).context("Invalid YAML launch file")?
        }
        _ => toml::from_str(&contents).context("Invalid TOML launch file")?,
    };

    info!(
        "Loaded launch file {:?} with {} actions",
        path,
        description.actions.len()
    );
    Ok(description)
}

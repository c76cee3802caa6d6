use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Load configuration from a YAML file
///
/// A missing file is not an error: the defaults are returned instead.
/// Environment placeholders are substituted before parsing and the result is
/// normalized.
#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MartConfig> {
    let path = path.as_ref();

    if !path.exists() {
        info!("Config file {:?} not found, using defaults", path);
        let mut config = MartConfig::default();
        config.normalize();
        return Ok(config);
    }

    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    parse_config(&content)
}

/// Parse configuration from YAML text
pub fn parse_config(content: &str) -> Result<MartConfig> {
    let substituted = substitution::substitute_env_vars(content)?;

    // An empty document deserializes to unit, not to a mapping
    let mut config: MartConfig = if substituted.trim().is_empty() {
        MartConfig::default()
    } else {
        serde_yaml::from_str(&substituted).with_context(|| "Failed to parse YAML configuration")?
    };

    config.normalize();
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> MartConfig {
    MartConfig::default()
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &MartConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}

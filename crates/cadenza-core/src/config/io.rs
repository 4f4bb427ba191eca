//! YAML configuration I/O
//!
//! Works with any serializable configuration type.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file
///
/// A missing file yields the default configuration. A file that exists but
/// cannot be read or parsed is an error.
pub fn load_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return Ok(T::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    log::info!("load_config: Successfully loaded config from {:?}", path);
    Ok(config)
}

/// Load configuration, falling back to defaults on any error
pub fn load_config_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    load_config(path).unwrap_or_else(|e| {
        log::warn!("load_config: {:#}, using defaults", e);
        T::default()
    })
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/path/engine.yaml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.yaml");

        let config = EngineConfig {
            sample_rate: 44100.0,
            max_block_size: 256,
            bpm: 96.0,
            ..EngineConfig::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "sample_rate: [not, a, number]").unwrap();

        let err = load_config::<EngineConfig>(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));

        let fallback: EngineConfig = load_config_or_default(&path);
        assert_eq!(fallback, EngineConfig::default());
    }
}
